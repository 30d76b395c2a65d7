//! Supervisor core for the Coverx download manager.
//!
//! Spawns and watches the external aria2 engine, keeps one coherent task
//! view reconciled over its JSON-RPC surface, records removed tasks in a
//! durable ledger of its own, and codes shareable deep links. UI surfaces
//! talk to it exclusively through [`SupervisorHandle`] commands and
//! [`Event`] broadcasts.

pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod supervisor;
pub mod tasks;

pub use config::SupervisorConfig;
pub use supervisor::{AddOutcome, Event, Supervisor, SupervisorHandle};
pub use tasks::model::{DownloadOptions, DownloadTask, TaskFile, TaskStatus};
pub use tasks::progress::Progress;
