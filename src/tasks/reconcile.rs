//! Store vs. transaction log consistency check
//!
//! Read-only: a divergence is reported, never repaired.

use std::collections::{HashMap, HashSet};

use super::txlog::TransactionLogEntry;
use super::types::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMismatch {
    pub task_id: String,
    pub store_status: TaskStatus,
    pub logged_status: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub store: String,
    /// Tasks compared
    pub checked: usize,
    /// Tasks in the store with no log entry at all
    pub missing_from_log: Vec<String>,
    pub mismatches: Vec<StatusMismatch>,
    /// Task ids logged for this store that are neither live nor archived
    pub unknown_in_log: Vec<String>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_log.is_empty()
            && self.mismatches.is_empty()
            && self.unknown_in_log.is_empty()
    }

    /// Compare each live task with the last status the log recorded for it.
    pub fn compare(
        store: &str,
        tasks: &[Task],
        archived: &HashSet<String>,
        entries: &[TransactionLogEntry],
    ) -> Self {
        let mut last_logged: HashMap<&str, TaskStatus> = HashMap::new();
        let mut log_order: Vec<&str> = Vec::new();
        for entry in entries.iter().filter(|e| e.store == store) {
            if last_logged
                .insert(entry.task_id.as_str(), entry.new_status)
                .is_none()
            {
                log_order.push(entry.task_id.as_str());
            }
        }

        let mut report = ReconcileReport {
            store: store.to_string(),
            checked: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match last_logged.get(task.task_id.as_str()) {
                None => report.missing_from_log.push(task.task_id.clone()),
                Some(logged) if *logged != task.status => report.mismatches.push(StatusMismatch {
                    task_id: task.task_id.clone(),
                    store_status: task.status,
                    logged_status: *logged,
                }),
                Some(_) => {}
            }
        }

        let live: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        report.unknown_in_log = log_order
            .into_iter()
            .filter(|id| !live.contains(id) && !archived.contains(*id))
            .map(str::to_string)
            .collect();
        report
    }
}
