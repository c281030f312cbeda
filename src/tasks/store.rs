//! Shared task board backed by JSON files under `tasks/`
//!
//! Every mutation runs under the store's file lock and goes through
//! `ResilientStore::write_with_backup`, then is recorded in the transaction
//! log. Lock order is always store, then archive, then log.

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::archive::{archive_path, merge_into, ArchiveKind, ArchiveSummary};
use super::reconcile::ReconcileReport;
use super::txlog::{TransactionLog, TransactionLogEntry};
use super::types::{NewTask, Task, TaskStatus, TASK_SCHEMA_VERSION};
use crate::config::Config;
use crate::errors::{Result, StoreError};
use crate::fs::resilient::ResilientStore;
use crate::validation::{validate_id, validate_store_name};

/// Actor recorded when the caller does not name one
pub const DEFAULT_ACTOR: &str = "system";

/// Options for [`TaskStore::update_task_status`]
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub actor: String,
    pub note: Option<String>,
    /// New owner to record with the transition
    pub owner: Option<String>,
    /// Overrides `tasks.fail_on_corrupt` from the config
    pub fail_on_corrupt: Option<bool>,
    /// Overrides `locks.lock_timeout_ms` from the config
    pub lock_timeout: Option<Duration>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            actor: DEFAULT_ACTOR.to_string(),
            note: None,
            owner: None,
            fail_on_corrupt: None,
            lock_timeout: None,
        }
    }
}

impl UpdateOptions {
    pub fn by(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ..Self::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn fail_on_corrupt(mut self, fail: bool) -> Self {
        self.fail_on_corrupt = Some(fail);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptStore {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse a task list, all or nothing.
pub(crate) fn parse_task_list(path: &Path, bytes: &[u8]) -> Result<Vec<Task>> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| corrupt(path, format!("invalid JSON: {e}")))?;
    let serde_json::Value::Array(items) = value else {
        return Err(corrupt(path, "expected a list of tasks"));
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let task: Task = serde_json::from_value(item)
            .map_err(|e| corrupt(path, format!("task at index {idx}: {e}")))?;
        if task.schema_version > TASK_SCHEMA_VERSION {
            return Err(corrupt(
                path,
                format!(
                    "task '{}' has schema version {}, newer than supported {TASK_SCHEMA_VERSION}",
                    task.task_id, task.schema_version
                ),
            ));
        }
        if !seen.insert(task.task_id.clone()) {
            return Err(corrupt(path, format!("duplicate task id '{}'", task.task_id)));
        }
        tasks.push(task);
    }
    Ok(tasks)
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
    io: ResilientStore,
    log: TransactionLog,
    fail_on_corrupt: bool,
}

impl TaskStore {
    pub fn new(config: &Config) -> Self {
        let dir = config.tasks_dir();
        let io = ResilientStore::from_config(config);
        Self {
            log: TransactionLog::new(&dir, io.clone()),
            dir,
            io,
            fail_on_corrupt: config.tasks.fail_on_corrupt,
        }
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.dir
    }

    pub fn transaction_log(&self) -> &TransactionLog {
        &self.log
    }

    /// Path of a store's task file, after validating the name.
    pub fn store_path(&self, store: &str) -> Result<PathBuf> {
        validate_store_name(store)?;
        Ok(self.dir.join(format!("{store}.json")))
    }

    /// All tasks in `store`. A missing store reads as empty; a malformed one
    /// is `CorruptStore`, never a partial list.
    pub fn read_tasks(&self, store: &str) -> Result<Vec<Task>> {
        let path = self.store_path(store)?;
        self.read_tasks_at(&path)
    }

    fn read_tasks_at(&self, path: &Path) -> Result<Vec<Task>> {
        match self.io.read_if_exists(path)? {
            Some(bytes) => parse_task_list(path, &bytes),
            None => Ok(Vec::new()),
        }
    }

    fn write_tasks(&self, path: &Path, tasks: &[Task]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(tasks)
            .map_err(|e| StoreError::Validation(format!("task list not serializable: {e}")))?;
        self.io.write_with_backup(path, &bytes)
    }

    /// Change a task's status.
    ///
    /// Returns `Ok(false)` when the task does not exist, or when the store is
    /// unreadable and `fail_on_corrupt` is off. An unchanged status is
    /// `Ok(true)` without touching the file or the history.
    pub fn update_task_status(
        &self,
        store: &str,
        task_id: &str,
        new_status: &str,
        opts: &UpdateOptions,
    ) -> Result<bool> {
        self.apply_update(store, task_id, new_status, opts, |_| true)
    }

    fn apply_update<F>(
        &self,
        store: &str,
        task_id: &str,
        new_status: &str,
        opts: &UpdateOptions,
        precondition: F,
    ) -> Result<bool>
    where
        F: Fn(&Task) -> bool,
    {
        let path = self.store_path(store)?;
        let timeout = opts.lock_timeout.unwrap_or(self.io.lock_timeout());
        let _lock = self.io.lock_with_timeout(&path, timeout)?;

        let mut tasks = match self.read_tasks_at(&path) {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(
                    store,
                    task_id,
                    kind = %e.kind(),
                    error = %e,
                    "task store unreadable, update not applied"
                );
                if opts.fail_on_corrupt.unwrap_or(self.fail_on_corrupt) {
                    return Err(e);
                }
                return Ok(false);
            }
        };

        let Some(idx) = tasks.iter().position(|t| t.task_id == task_id) else {
            let available: Vec<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
            tracing::warn!(store, task_id, available = ?available, "task not found");
            return Ok(false);
        };

        let status: TaskStatus = new_status.parse()?;
        if !precondition(&tasks[idx]) {
            tracing::info!(
                store,
                task_id,
                status = %tasks[idx].status,
                owner = tasks[idx].owner.as_deref().unwrap_or("-"),
                "precondition not met, update skipped"
            );
            return Ok(false);
        }

        let old_status = tasks[idx].status;
        if old_status == status {
            tracing::debug!(store, task_id, status = %status, "status unchanged");
            return Ok(true);
        }

        if status == TaskStatus::Claimed {
            let unmet = self.unmet_dependencies(store, &tasks, &tasks[idx])?;
            if !unmet.is_empty() {
                return Err(StoreError::Validation(format!(
                    "task '{task_id}' cannot be claimed: dependencies not completed: {}",
                    unmet.join(", ")
                )));
            }
        }

        let now = Utc::now();
        let task = &mut tasks[idx];
        task.transition(status, &opts.actor, opts.note.clone(), now);
        if let Some(owner) = &opts.owner {
            task.owner = Some(owner.clone());
        }

        self.write_tasks(&path, &tasks)?;
        self.log.append(&TransactionLogEntry::new(
            store,
            task_id,
            Some(old_status),
            status,
            &opts.actor,
            opts.note.clone(),
            now,
        ))?;

        tracing::info!(
            store,
            task_id,
            actor = %opts.actor,
            old_status = %old_status,
            new_status = %status,
            "task status updated"
        );
        Ok(true)
    }

    /// Ids of completed tasks: live ones plus the completed archive.
    fn completed_ids(&self, store: &str, tasks: &[Task]) -> Result<HashSet<String>> {
        let mut done: HashSet<String> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.task_id.clone())
            .collect();
        let archive = archive_path(&self.dir, store, ArchiveKind::Completed);
        done.extend(self.read_tasks_at(&archive)?.into_iter().map(|t| t.task_id));
        Ok(done)
    }

    fn unmet_dependencies(&self, store: &str, tasks: &[Task], task: &Task) -> Result<Vec<String>> {
        if task.dependencies.is_empty() {
            return Ok(Vec::new());
        }
        let done = self.completed_ids(store, tasks)?;
        Ok(task
            .dependencies
            .iter()
            .filter(|dep| !done.contains(dep.as_str()))
            .cloned()
            .collect())
    }

    /// Create a Pending task. Rejects invalid or duplicate ids and a task
    /// depending on itself.
    pub fn add_task(&self, store: &str, new: NewTask, actor: &str) -> Result<Task> {
        let path = self.store_path(store)?;
        validate_id(&new.task_id)?;
        for dep in &new.dependencies {
            validate_id(dep)?;
            if *dep == new.task_id {
                return Err(StoreError::Validation(format!(
                    "task '{}' cannot depend on itself",
                    new.task_id
                )));
            }
        }

        let _lock = self.io.lock(&path)?;
        let mut tasks = self.read_tasks_at(&path)?;
        if tasks.iter().any(|t| t.task_id == new.task_id) {
            return Err(StoreError::Validation(format!(
                "task '{}' already exists in store '{store}'",
                new.task_id
            )));
        }

        let now = Utc::now();
        let task = new.into_task(actor, now);
        tasks.push(task.clone());
        self.write_tasks(&path, &tasks)?;
        self.log.append(&TransactionLogEntry::new(
            store,
            &task.task_id,
            None,
            task.status,
            actor,
            None,
            now,
        ))?;

        tracing::info!(store, task_id = %task.task_id, actor, "task created");
        Ok(task)
    }

    /// Claim a Pending or Ready task for `agent_id`.
    ///
    /// `Ok(false)` when the task is missing or already owned by someone
    /// else. Re-claiming one's own task is a no-op `Ok(true)`.
    pub fn claim_task(
        &self,
        store: &str,
        task_id: &str,
        agent_id: &str,
        lock_timeout: Option<Duration>,
    ) -> Result<bool> {
        validate_id(agent_id)?;
        let opts = UpdateOptions {
            lock_timeout,
            ..UpdateOptions::by(agent_id).with_owner(agent_id)
        };
        self.apply_update(store, task_id, TaskStatus::Claimed.as_str(), &opts, |task| {
            task.status.is_claimable()
                || (task.status == TaskStatus::Claimed && task.owner.as_deref() == Some(agent_id))
        })
    }

    /// Pending or Ready tasks whose dependencies are all completed, most
    /// urgent first, then oldest first.
    pub fn claimable_tasks(&self, store: &str) -> Result<Vec<Task>> {
        let tasks = self.read_tasks(store)?;
        let done = self.completed_ids(store, &tasks)?;
        let mut claimable: Vec<Task> = tasks
            .into_iter()
            .filter(|t| t.status.is_claimable())
            .filter(|t| t.dependencies.iter().all(|d| done.contains(d.as_str())))
            .collect();
        claimable.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.timestamp_created.cmp(&b.timestamp_created))
        });
        Ok(claimable)
    }

    /// Move Completed and Failed tasks into the store's archive.
    ///
    /// Archives are written before the store is rewritten, so a crash in
    /// between can duplicate a task into the archive but never lose it.
    pub fn archive_terminal(&self, store: &str, actor: &str) -> Result<ArchiveSummary> {
        let path = self.store_path(store)?;
        let _lock = self.io.lock(&path)?;
        let tasks = self.read_tasks_at(&path)?;

        let mut batches: Vec<(ArchiveKind, Vec<Task>)> =
            ArchiveKind::ALL.iter().map(|k| (*k, Vec::new())).collect();
        let mut remaining = Vec::new();
        for task in tasks {
            match ArchiveKind::for_status(task.status) {
                Some(kind) => {
                    if let Some((_, batch)) = batches.iter_mut().find(|(k, _)| *k == kind) {
                        batch.push(task);
                    }
                }
                None => remaining.push(task),
            }
        }

        let mut summary = ArchiveSummary {
            remaining: remaining.len(),
            ..ArchiveSummary::default()
        };
        for (kind, batch) in batches {
            if batch.is_empty() {
                continue;
            }
            let ids: Vec<String> = batch.iter().map(|t| t.task_id.clone()).collect();
            let archive = archive_path(&self.dir, store, kind);
            let _archive_lock = self.io.lock(&archive)?;
            let mut archived = self.read_tasks_at(&archive)?;
            merge_into(&mut archived, batch);
            self.write_tasks(&archive, &archived)?;
            match kind {
                ArchiveKind::Completed => summary.completed = ids,
                ArchiveKind::Failed => summary.failed = ids,
            }
        }

        if summary.is_empty() {
            return Ok(summary);
        }
        self.write_tasks(&path, &remaining)?;
        tracing::info!(
            store,
            actor,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            remaining = summary.remaining,
            "archived terminal tasks"
        );
        Ok(summary)
    }

    /// Compare the store with the transaction log. Never modifies either.
    pub fn reconcile(&self, store: &str) -> Result<ReconcileReport> {
        let tasks = self.read_tasks(store)?;
        let mut archived = HashSet::new();
        for kind in ArchiveKind::ALL {
            let archive = archive_path(&self.dir, store, kind);
            archived.extend(self.read_tasks_at(&archive)?.into_iter().map(|t| t.task_id));
        }
        let entries = self.log.read_all()?;
        let report = ReconcileReport::compare(store, &tasks, &archived, &entries);
        if !report.is_consistent() {
            tracing::warn!(
                store,
                missing = report.missing_from_log.len(),
                mismatches = report.mismatches.len(),
                unknown = report.unknown_in_log.len(),
                "task store and transaction log diverge"
            );
        }
        Ok(report)
    }
}
