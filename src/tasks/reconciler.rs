//! Poll-and-merge of the engine's three task queues.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::Aria2Session;
use crate::error::RpcError;
use crate::tasks::model::{DownloadTask, TaskStatus};

/// Fetches the active, waiting and stopped sets and merges them. Any
/// failure aborts the whole cycle; a partial snapshot is never returned.
pub async fn poll_once(
    session: &Aria2Session,
    page_size: u32,
) -> Result<Vec<DownloadTask>, RpcError> {
    let (active, waiting, stopped) = tokio::try_join!(
        session.tell_active(),
        session.tell_waiting(0, page_size),
        session.tell_stopped(0, page_size),
    )?;
    Ok(merge(active, waiting, stopped))
}

/// Concatenates the three sets in display order: active, waiting, stopped.
/// The engine guarantees the sets are disjoint.
fn merge(
    active: Vec<DownloadTask>,
    waiting: Vec<DownloadTask>,
    stopped: Vec<DownloadTask>,
) -> Vec<DownloadTask> {
    let mut merged = Vec::with_capacity(active.len() + waiting.len() + stopped.len());
    merged.extend(active);
    merged.extend(waiting);
    merged.extend(stopped);
    merged
}

/// Scans the active+waiting union for a task already sourced from `url`.
/// The caller decides what to do with a hit; nothing is dropped or
/// submitted here.
pub fn find_duplicate<'a>(tasks: &'a [DownloadTask], url: &str) -> Option<&'a DownloadTask> {
    tasks
        .iter()
        .filter(|task| matches!(task.status, TaskStatus::Active | TaskStatus::Waiting))
        .find(|task| {
            task.files
                .iter()
                .flat_map(|file| &file.uris)
                .any(|source| source.uri == url)
        })
}

/// Polls on a fixed interval for the session's lifetime. Failed cycles are
/// logged and the previous snapshot stays current; the next tick retries
/// unconditionally, with no backoff and no failure cap.
pub fn spawn_poll_loop(
    session: Aria2Session,
    interval: Duration,
    page_size: u32,
    updates: mpsc::Sender<Vec<DownloadTask>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match poll_once(&session, page_size).await {
                Ok(snapshot) => {
                    if updates.send(snapshot).await.is_err() {
                        break;
                    }
                }
                Err(RpcError::NotConnected) => break,
                Err(e) => log::warn!("poll cycle failed, keeping previous snapshot: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::{FileUri, TaskFile};

    fn task(gid: &str, status: TaskStatus, url: &str) -> DownloadTask {
        DownloadTask {
            gid: gid.to_string(),
            status,
            total_length: 1000,
            completed_length: 0,
            download_speed: 0,
            files: vec![TaskFile {
                path: format!("/downloads/{gid}.bin"),
                length: 1000,
                completed_length: 0,
                uris: vec![FileUri {
                    uri: url.to_string(),
                    status: "used".to_string(),
                }],
            }],
            dir: "/downloads".to_string(),
            error_message: None,
            removed_at: None,
        }
    }

    #[test]
    fn merge_keeps_display_order_and_size() {
        let active = vec![task("a1", TaskStatus::Active, "https://x.test/a")];
        let waiting = vec![
            task("w1", TaskStatus::Waiting, "https://x.test/w1"),
            task("w2", TaskStatus::Waiting, "https://x.test/w2"),
        ];
        let stopped = vec![task("s1", TaskStatus::Complete, "https://x.test/s")];

        let merged = merge(active, waiting, stopped);
        let gids: Vec<&str> = merged.iter().map(|t| t.gid.as_str()).collect();
        assert_eq!(gids, ["a1", "w1", "w2", "s1"]);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn duplicate_url_in_waiting_set_is_found() {
        let tasks = vec![
            task("a1", TaskStatus::Active, "https://x.test/other.zip"),
            task("w1", TaskStatus::Waiting, "https://x.test/file.zip"),
        ];
        let hit = find_duplicate(&tasks, "https://x.test/file.zip").unwrap();
        assert_eq!(hit.gid, "w1");
    }

    #[test]
    fn stopped_tasks_do_not_count_as_duplicates() {
        let tasks = vec![task("s1", TaskStatus::Complete, "https://x.test/file.zip")];
        assert!(find_duplicate(&tasks, "https://x.test/file.zip").is_none());
    }

    #[test]
    fn unrelated_url_is_not_a_duplicate() {
        let tasks = vec![task("w1", TaskStatus::Waiting, "https://x.test/file.zip")];
        assert!(find_duplicate(&tasks, "https://x.test/nothere.zip").is_none());
    }
}
