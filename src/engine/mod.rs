//! Engine process control and its RPC surface.

pub mod events;
pub mod process;
pub mod rpc;

pub use process::EngineProcess;
pub use rpc::Aria2Session;
