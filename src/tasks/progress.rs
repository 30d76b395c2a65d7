//! Aggregate progress over the active set.

use crate::tasks::model::{DownloadTask, TaskStatus};

/// Overall completion for a host-level indicator. `Indeterminate` means
/// there is nothing meaningful to show (no active task, or sizes not yet
/// negotiated) and maps to a cleared indicator, not to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    Indeterminate,
    Ratio(f64),
}

/// Recomputed in full on every published snapshot.
pub fn aggregate(tasks: &[DownloadTask]) -> Progress {
    let mut total: u64 = 0;
    let mut completed: u64 = 0;
    for task in tasks.iter().filter(|t| t.status == TaskStatus::Active) {
        total += task.total_length;
        completed += task.completed_length;
    }
    if total == 0 {
        Progress::Indeterminate
    } else {
        Progress::Ratio(completed as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(gid: &str, total: u64, completed: u64) -> DownloadTask {
        DownloadTask {
            gid: gid.to_string(),
            status: TaskStatus::Active,
            total_length: total,
            completed_length: completed,
            download_speed: 0,
            files: Vec::new(),
            dir: String::new(),
            error_message: None,
            removed_at: None,
        }
    }

    #[test]
    fn single_active_task_reports_its_ratio() {
        let tasks = vec![active("a1", 1000, 250)];
        assert_eq!(aggregate(&tasks), Progress::Ratio(0.25));
    }

    #[test]
    fn no_active_tasks_is_indeterminate() {
        assert_eq!(aggregate(&[]), Progress::Indeterminate);
    }

    #[test]
    fn unknown_sizes_are_indeterminate() {
        let tasks = vec![active("a1", 0, 0), active("a2", 0, 0)];
        assert_eq!(aggregate(&tasks), Progress::Indeterminate);
    }

    #[test]
    fn non_active_tasks_are_excluded() {
        let mut paused = active("p1", 4000, 4000);
        paused.status = TaskStatus::Paused;
        let tasks = vec![paused, active("a1", 1000, 500)];
        assert_eq!(aggregate(&tasks), Progress::Ratio(0.5));
    }
}
