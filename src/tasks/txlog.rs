//! Append-only transaction log shared by every task store
//!
//! One JSON object per line in `tasks/transaction_log.jsonl`. Appends take the
//! log's own lock, so entries from different stores never interleave even
//! though each store has its own lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::types::TaskStatus;
use crate::errors::{Result, StoreError};
use crate::fs::resilient::ResilientStore;

/// Current transaction log entry schema version
pub const LOG_SCHEMA_VERSION: u32 = 1;

/// File name of the transaction log inside the tasks directory
pub const LOG_FILE: &str = "transaction_log.jsonl";

fn default_schema_version() -> u32 {
    LOG_SCHEMA_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransactionLogEntry {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub store: String,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    /// None for task creation
    pub old_status: Option<TaskStatus>,
    pub new_status: TaskStatus,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransactionLogEntry {
    pub fn new(
        store: &str,
        task_id: &str,
        old_status: Option<TaskStatus>,
        new_status: TaskStatus,
        actor: &str,
        note: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: LOG_SCHEMA_VERSION,
            store: store.to_string(),
            task_id: task_id.to_string(),
            timestamp,
            old_status,
            new_status,
            actor: actor.to_string(),
            note,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionLog {
    path: PathBuf,
    store: ResilientStore,
}

impl TransactionLog {
    pub fn new(tasks_dir: &Path, store: ResilientStore) -> Self {
        Self {
            path: tasks_dir.join(LOG_FILE),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &TransactionLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(|e| {
            StoreError::Validation(format!("log entry for {} not serializable: {e}", entry.task_id))
        })?;
        self.store.append_line(&self.path, &line)
    }

    /// All entries in commit order. A malformed line is reported with its
    /// 1-based line number; blank lines are skipped.
    pub fn read_all(&self) -> Result<Vec<TransactionLogEntry>> {
        let Some(bytes) = self.store.read_if_exists(&self.path)? else {
            return Ok(Vec::new());
        };
        let content = String::from_utf8(bytes).map_err(|e| StoreError::CorruptStore {
            path: self.path.clone(),
            reason: format!("not valid UTF-8: {e}"),
        })?;

        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransactionLogEntry =
                serde_json::from_str(line).map_err(|e| StoreError::CorruptStore {
                    path: self.path.clone(),
                    reason: format!("line {}: {e}", idx + 1),
                })?;
            if entry.schema_version > LOG_SCHEMA_VERSION {
                return Err(StoreError::CorruptStore {
                    path: self.path.clone(),
                    reason: format!(
                        "line {}: schema version {} is newer than supported {LOG_SCHEMA_VERSION}",
                        idx + 1,
                        entry.schema_version
                    ),
                });
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Entries for one task in one store, in commit order.
    pub fn entries_for(&self, store: &str, task_id: &str) -> Result<Vec<TransactionLogEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.store == store && e.task_id == task_id)
            .collect())
    }
}
