//! Task data model, mirroring the engine's wire format.
//!
//! The engine reports byte counts as decimal strings; `decimal_string`
//! adapts those to `u64` on the way in and back to strings on the way out
//! so persisted records stay interchangeable with live ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine-reported task state, plus the supervisor-assigned `removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
}

impl TaskStatus {
    /// True for states the engine will still act on a stop request for.
    pub fn is_stoppable(self) -> bool {
        matches!(self, Self::Active | Self::Waiting | Self::Paused)
    }
}

/// One source URI attached to a file of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUri {
    pub uri: String,
    #[serde(default)]
    pub status: String,
}

/// One target file of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFile {
    pub path: String,
    #[serde(with = "decimal_string")]
    pub length: u64,
    #[serde(with = "decimal_string")]
    pub completed_length: u64,
    #[serde(default)]
    pub uris: Vec<FileUri>,
}

/// A transfer unit tracked by the engine, identified by its gid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub gid: String,
    pub status: TaskStatus,
    #[serde(with = "decimal_string")]
    pub total_length: u64,
    #[serde(with = "decimal_string")]
    pub completed_length: u64,
    #[serde(default, with = "decimal_string")]
    pub download_speed: u64,
    #[serde(default)]
    pub files: Vec<TaskFile>,
    #[serde(default)]
    pub dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Stamped by the supervisor when the task enters the removed ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

/// Response of the engine's version probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub enabled_features: Vec<String>,
}

/// Per-task options forwarded to the engine on add.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
}

pub(crate) mod decimal_string {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
            Raw::Number(number) => Ok(number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_FIXTURE: &str = r#"{
        "gid": "2089b05ecca3d829",
        "status": "active",
        "totalLength": "34896138",
        "completedLength": "8724234",
        "downloadSpeed": "120042",
        "dir": "/downloads",
        "files": [{
            "path": "/downloads/file.zip",
            "length": "34896138",
            "completedLength": "8724234",
            "uris": [{"uri": "https://example.com/file.zip", "status": "used"}]
        }]
    }"#;

    #[test]
    fn deserializes_engine_status_payload() {
        let task: DownloadTask = serde_json::from_str(STATUS_FIXTURE).unwrap();
        assert_eq!(task.gid, "2089b05ecca3d829");
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.total_length, 34_896_138);
        assert_eq!(task.completed_length, 8_724_234);
        assert_eq!(task.download_speed, 120_042);
        assert_eq!(task.files.len(), 1);
        assert_eq!(task.files[0].uris[0].uri, "https://example.com/file.zip");
        assert!(task.error_message.is_none());
    }

    #[test]
    fn completed_never_exceeds_total_in_engine_payloads() {
        let task: DownloadTask = serde_json::from_str(STATUS_FIXTURE).unwrap();
        assert!(task.total_length == 0 || task.completed_length <= task.total_length);
    }

    #[test]
    fn byte_counts_round_trip_as_decimal_strings() {
        let task: DownloadTask = serde_json::from_str(STATUS_FIXTURE).unwrap();
        let raw = serde_json::to_value(&task).unwrap();
        assert_eq!(raw["totalLength"], "34896138");
        assert_eq!(raw["status"], "active");
        assert!(raw.get("removedAt").is_none());
    }

    #[test]
    fn byte_counts_accept_plain_integers() {
        let task: DownloadTask = serde_json::from_str(
            r#"{"gid": "a", "status": "waiting", "totalLength": 100, "completedLength": 0}"#,
        )
        .unwrap();
        assert_eq!(task.total_length, 100);
        assert_eq!(task.download_speed, 0);
        assert!(task.files.is_empty());
    }

    #[test]
    fn removed_status_round_trips() {
        let raw = serde_json::to_string(&TaskStatus::Removed).unwrap();
        assert_eq!(raw, r#""removed""#);
        let status: TaskStatus = serde_json::from_str(&raw).unwrap();
        assert_eq!(status, TaskStatus::Removed);
    }
}
