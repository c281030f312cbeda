//! Shared task board
//!
//! This module provides:
//! - Versioned task records and the status vocabulary
//! - `TaskStore`: locked, backed-up updates, creation, claiming and archiving
//! - The append-only transaction log and store/log reconciliation

mod archive;
mod reconcile;
mod store;
mod txlog;
mod types;

pub use archive::{archive_path, ArchiveKind, ArchiveSummary};
pub use reconcile::{ReconcileReport, StatusMismatch};
pub use store::{TaskStore, UpdateOptions, DEFAULT_ACTOR};
pub use txlog::{TransactionLog, TransactionLogEntry, LOG_FILE, LOG_SCHEMA_VERSION};
pub use types::{HistoryEntry, NewTask, Priority, Task, TaskStatus, TASK_SCHEMA_VERSION};
