//! Durable record of removed tasks.
//!
//! The ledger is the application's own bookkeeping, independent of the
//! engine's memory: once a task is removed it exists only here. Records
//! are frozen snapshots and are never mutated after they are appended.
//! Entries are kept forever; there is no eviction or compaction.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::tasks::model::{DownloadTask, TaskStatus};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LedgerFile {
    removed_downloads: Vec<DownloadTask>,
    last_download_path: String,
}

pub struct RemovedLedger {
    path: PathBuf,
    state: LedgerFile,
}

impl RemovedLedger {
    /// Reads the ledger from disk. A missing file is an empty ledger;
    /// malformed or unreadable content is logged and treated as empty.
    pub async fn load(path: PathBuf) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    log::warn!("ledger at {} is malformed, starting empty: {e}", path.display());
                    LedgerFile::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => LedgerFile::default(),
            Err(e) => {
                log::warn!("ledger at {} is unreadable, starting empty: {e}", path.display());
                LedgerFile::default()
            }
        };
        Self { path, state }
    }

    pub fn contains(&self, gid: &str) -> bool {
        self.state.removed_downloads.iter().any(|r| r.gid == gid)
    }

    /// Appends a frozen snapshot, tagged `removed`. Returns false without
    /// touching the ledger when the gid is already recorded.
    pub fn append(&mut self, mut record: DownloadTask) -> bool {
        if self.contains(&record.gid) {
            return false;
        }
        record.status = TaskStatus::Removed;
        self.state.removed_downloads.push(record);
        true
    }

    pub fn records(&self) -> &[DownloadTask] {
        &self.state.removed_downloads
    }

    pub fn last_download_path(&self) -> Option<&str> {
        if self.state.last_download_path.is_empty() {
            None
        } else {
            Some(&self.state.last_download_path)
        }
    }

    pub fn set_last_download_path(&mut self, path: String) {
        self.state.last_download_path = path;
    }

    /// Writes the full ledger, retrying once before giving up loudly.
    /// The write goes through a temp file and a rename, so a successful
    /// persist is never observable half-done.
    pub async fn persist(&self) -> Result<(), PersistenceError> {
        match self.write_once().await {
            Ok(()) => Ok(()),
            Err(first) => {
                log::warn!("ledger write failed, retrying once: {first}");
                self.write_once().await.inspect_err(|e| {
                    log::error!("ledger write failed after retry: {e}");
                })
            }
        }
    }

    async fn write_once(&self) -> Result<(), PersistenceError> {
        let body = serde_json::to_string_pretty(&self.state)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, &body)
            .await
            .map_err(|source| PersistenceError::Write {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(gid: &str) -> DownloadTask {
        DownloadTask {
            gid: gid.to_string(),
            status: TaskStatus::Complete,
            total_length: 2048,
            completed_length: 2048,
            download_speed: 0,
            files: Vec::new(),
            dir: "/downloads".to_string(),
            error_message: None,
            removed_at: None,
        }
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RemovedLedger::load(dir.path().join("removed.json")).await;
        assert!(ledger.records().is_empty());
        assert!(ledger.last_download_path().is_none());
    }

    #[tokio::test]
    async fn malformed_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("removed.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let ledger = RemovedLedger::load(path).await;
        assert!(ledger.records().is_empty());
    }

    #[tokio::test]
    async fn appended_records_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("removed.json");

        let mut ledger = RemovedLedger::load(path.clone()).await;
        assert!(ledger.append(record("2089b05ecca3d829")));
        ledger.set_last_download_path("/downloads".to_string());
        ledger.persist().await.unwrap();

        let reloaded = RemovedLedger::load(path).await;
        assert_eq!(reloaded.records().len(), 1);
        assert_eq!(reloaded.records()[0].gid, "2089b05ecca3d829");
        assert_eq!(reloaded.records()[0].status, TaskStatus::Removed);
        assert_eq!(reloaded.last_download_path(), Some("/downloads"));
    }

    #[tokio::test]
    async fn second_append_of_same_gid_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = RemovedLedger::load(dir.path().join("removed.json")).await;
        assert!(ledger.append(record("aa")));
        assert!(!ledger.append(record("aa")));
        assert_eq!(ledger.records().len(), 1);
    }

    #[tokio::test]
    async fn appended_record_is_tagged_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = RemovedLedger::load(dir.path().join("removed.json")).await;
        ledger.append(record("aa"));
        assert_eq!(ledger.records()[0].status, TaskStatus::Removed);
        assert!(ledger.contains("aa"));
    }
}
