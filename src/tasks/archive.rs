//! Archive layout for terminal tasks
//!
//! Completed and failed tasks are moved out of the live store into
//! `tasks/archive/<store>/completed.json` and `.../failed.json`.

use std::path::{Path, PathBuf};

use super::types::{Task, TaskStatus};

/// Directory name under the tasks dir holding all archives
pub const ARCHIVE_DIR: &str = "archive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Completed,
    Failed,
}

impl ArchiveKind {
    pub const ALL: [ArchiveKind; 2] = [ArchiveKind::Completed, ArchiveKind::Failed];

    pub fn for_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed => Some(ArchiveKind::Completed),
            TaskStatus::Failed => Some(ArchiveKind::Failed),
            _ => None,
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            ArchiveKind::Completed => "completed.json",
            ArchiveKind::Failed => "failed.json",
        }
    }
}

pub fn archive_dir(tasks_dir: &Path, store: &str) -> PathBuf {
    tasks_dir.join(ARCHIVE_DIR).join(store)
}

pub fn archive_path(tasks_dir: &Path, store: &str, kind: ArchiveKind) -> PathBuf {
    archive_dir(tasks_dir, store).join(kind.file_name())
}

/// What [`crate::tasks::TaskStore::archive_terminal`] moved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveSummary {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Tasks left in the live store
    pub remaining: usize,
}

impl ArchiveSummary {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty()
    }
}

/// Add `incoming` to an archive list. A task archived again (for example
/// after a crash between the archive write and the store rewrite) replaces
/// its earlier copy instead of appearing twice.
pub fn merge_into(archive: &mut Vec<Task>, incoming: Vec<Task>) {
    for task in incoming {
        match archive.iter_mut().find(|t| t.task_id == task.task_id) {
            Some(existing) => *existing = task,
            None => archive.push(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::NewTask;
    use chrono::Utc;

    #[test]
    fn test_archive_paths() {
        let dir = Path::new("/data/tasks");
        assert_eq!(
            archive_path(dir, "board", ArchiveKind::Failed),
            PathBuf::from("/data/tasks/archive/board/failed.json")
        );
    }

    #[test]
    fn test_merge_replaces_duplicates() {
        let now = Utc::now();
        let mut archive = vec![NewTask::new("a").into_task("p", now)];
        let mut again = NewTask::new("a").into_task("p", now);
        again.failure_count = 5;
        merge_into(&mut archive, vec![again, NewTask::new("b").into_task("p", now)]);

        assert_eq!(archive.len(), 2);
        assert_eq!(archive[0].failure_count, 5);
    }
}
