//! Task state: model, reconciliation, removal ledger, progress.

pub mod ledger;
pub mod model;
pub mod progress;
pub mod reconciler;

pub use ledger::RemovedLedger;
pub use model::{DownloadOptions, DownloadTask, TaskFile, TaskStatus};
pub use progress::Progress;
