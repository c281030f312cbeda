//! Task record types shared by every store on the board
//!
//! Records are versioned and strict: unknown fields are rejected so that a
//! record written by a newer tool is never silently truncated on rewrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Current task record schema version
pub const TASK_SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    TASK_SCHEMA_VERSION
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, dependencies not yet checked
    Pending,
    /// Waiting to be picked up
    Ready,
    /// Owned by an agent that has not started work
    Claimed,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
    Failed,
    /// Failed and queued for another attempt
    #[serde(alias = "rescue-pending")]
    RescuePending,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Pending,
        TaskStatus::Ready,
        TaskStatus::Claimed,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::RescuePending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Claimed => "claimed",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::RescuePending => "rescue_pending",
        }
    }

    /// Completed and Failed tasks are moved out by archiving.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Transitions into these count against the task's failure budget.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::RescuePending)
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Ready)
    }

    /// Comma separated list of accepted values, for error messages
    pub fn allowed_values() -> String {
        TaskStatus::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = StoreError;

    /// Case-insensitive; `InProgress`, `in-progress` and `in_progress` all
    /// parse to the same value.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "ready" => Ok(TaskStatus::Ready),
            "claimed" => Ok(TaskStatus::Claimed),
            "inprogress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "rescuepending" => Ok(TaskStatus::RescuePending),
            _ => Err(StoreError::InvalidStatus {
                value: s.to_string(),
                allowed: TaskStatus::allowed_values(),
            }),
        }
    }
}

/// Ordering is most urgent first, so sorting ascending puts Critical on top.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(StoreError::Validation(format!(
                "Invalid priority: {s}. Valid values: critical, high, medium, low"
            ))),
        }
    }
}

/// One status transition in a task's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Task {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub failure_count: u32,
    pub timestamp_created: DateTime<Utc>,
    pub timestamp_updated: DateTime<Utc>,
    pub last_updated_by: String,
}

impl Task {
    /// Record a transition: status, history, failure count and update stamps.
    pub fn transition(
        &mut self,
        new_status: TaskStatus,
        actor: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) {
        if new_status.counts_as_failure() {
            self.failure_count += 1;
        }
        self.history.push(HistoryEntry {
            timestamp: now,
            actor: actor.to_string(),
            old_status: self.status,
            new_status,
            note,
        });
        self.status = new_status;
        self.timestamp_updated = now;
        self.last_updated_by = actor.to_string();
    }
}

/// Input for [`crate::tasks::TaskStore::add_task`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTask {
    pub task_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Priority,
    pub dependencies: Vec<String>,
}

impl NewTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub(crate) fn into_task(self, actor: &str, now: DateTime<Utc>) -> Task {
        Task {
            schema_version: TASK_SCHEMA_VERSION,
            task_id: self.task_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::Pending,
            priority: self.priority,
            dependencies: self.dependencies,
            owner: None,
            history: Vec::new(),
            failure_count: 0,
            timestamp_created: now,
            timestamp_updated: now,
            last_updated_by: actor.to_string(),
        }
    }
}
