//! Checkpoint types for per-agent state snapshots
//!
//! A checkpoint captures everything an agent needs to resume: the task it was
//! working on, how far it got through its mailbox, its working context and a
//! free-form short-term memory blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{Result, StoreError};

/// Current checkpoint document schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Kind of checkpoint. Each kind has its own directory and retention rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    /// Taken on a schedule by the agent loop
    Routine,
    /// Taken before a risky operation, released once it succeeds
    PreOperation,
    /// Taken when drift or an error forces recovery
    Recovery,
}

impl CheckpointType {
    pub const ALL: [CheckpointType; 3] = [
        CheckpointType::Routine,
        CheckpointType::PreOperation,
        CheckpointType::Recovery,
    ];

    /// Directory name used on disk
    pub fn dir_name(&self) -> &'static str {
        match self {
            CheckpointType::Routine => "routine",
            CheckpointType::PreOperation => "pre_operation",
            CheckpointType::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl std::str::FromStr for CheckpointType {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "routine" => Ok(CheckpointType::Routine),
            "pre_operation" | "preoperation" | "pre_op" => Ok(CheckpointType::PreOperation),
            "recovery" => Ok(CheckpointType::Recovery),
            _ => Err(StoreError::Validation(format!(
                "Invalid checkpoint type: {s}. Valid values: routine, pre_operation, recovery"
            ))),
        }
    }
}

/// Reference to the task an agent was working on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TaskRef {
    pub task_id: String,
    pub status: String,
    /// Fraction complete, 0.0..=1.0
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// How far the agent has processed its mailbox
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MailboxCursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub processed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Goals, constraints and recent decisions the agent is operating under
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OperationalContext {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub recent_decisions: Vec<String>,
}

/// Complete snapshot of an agent's operational state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentState {
    #[serde(default)]
    pub current_task: Option<TaskRef>,
    #[serde(default)]
    pub mailbox: MailboxCursor,
    #[serde(default)]
    pub context: OperationalContext,
    /// Short-term memory, opaque to the checkpoint layer
    #[serde(default)]
    pub memory: serde_json::Value,
}

impl AgentState {
    pub fn validate(&self) -> Result<()> {
        if let Some(task) = &self.current_task {
            if task.task_id.is_empty() {
                return Err(StoreError::Validation(
                    "current_task.task_id cannot be empty".to_string(),
                ));
            }
            if !(0.0..=1.0).contains(&task.progress) {
                return Err(StoreError::Validation(format!(
                    "current_task.progress must be within 0.0..=1.0, got {}",
                    task.progress
                )));
            }
        }
        Ok(())
    }

    /// Hex SHA-256 of the state's JSON encoding.
    pub fn checksum(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| StoreError::Validation(format!("state is not serializable: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// A checkpoint document as stored on disk
///
/// File location: `checkpoints/<agent_id>/<type>/<timestamp>.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub kind: CheckpointType,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
    pub state: AgentState,
}

impl Checkpoint {
    pub fn new(
        agent_id: &str,
        kind: CheckpointType,
        stamp: &str,
        created_at: DateTime<Utc>,
        state: AgentState,
    ) -> Result<Self> {
        state.validate()?;
        let checksum = state.checksum()?;
        Ok(Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            id: format!("{agent_id}-{kind}-{stamp}"),
            agent_id: agent_id.to_string(),
            kind,
            created_at,
            checksum,
            state,
        })
    }

    /// Structural checks beyond what deserialization already enforces.
    ///
    /// Returns the reason the document is unusable, if any.
    pub fn integrity_problem(&self) -> Option<String> {
        if self.schema_version == 0 || self.schema_version > CHECKPOINT_SCHEMA_VERSION {
            return Some(format!(
                "unsupported schema version {} (supported up to {CHECKPOINT_SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if let Err(e) = self.state.validate() {
            return Some(e.to_string());
        }
        match self.state.checksum() {
            Ok(actual) if actual == self.checksum => None,
            Ok(actual) => Some(format!(
                "checksum mismatch: recorded {}, computed {actual}",
                self.checksum
            )),
            Err(e) => Some(e.to_string()),
        }
    }
}

/// Lifecycle phase of a single checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPhase {
    Requested,
    Serializing,
    Written,
    Active,
    Pruned,
}

impl CheckpointPhase {
    /// Valid transitions:
    /// - `Requested` -> `Serializing`
    /// - `Serializing` -> `Written`
    /// - `Written` -> `Active` | `Pruned`
    /// - `Active` -> `Pruned`
    /// - `Pruned` is terminal
    pub fn can_transition_to(&self, next: CheckpointPhase) -> bool {
        matches!(
            (self, next),
            (CheckpointPhase::Requested, CheckpointPhase::Serializing)
                | (CheckpointPhase::Serializing, CheckpointPhase::Written)
                | (CheckpointPhase::Written, CheckpointPhase::Active)
                | (CheckpointPhase::Written, CheckpointPhase::Pruned)
                | (CheckpointPhase::Active, CheckpointPhase::Pruned)
        )
    }

    pub fn advance(self, next: CheckpointPhase) -> Result<CheckpointPhase> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StoreError::Validation(format!(
                "invalid checkpoint phase transition: {self:?} -> {next:?}"
            )))
        }
    }
}
