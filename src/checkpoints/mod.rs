//! Checkpoint module for per-agent state snapshots
//!
//! This module provides:
//! - Checkpoint types and document format
//! - Per-type retention rules
//! - `CheckpointManager`: create, restore, list, release and drift recovery

mod manager;
mod retention;
mod types;

pub use manager::{
    CheckpointEntry, CheckpointManager, RecoveryOutcome, StateSink, StateSource,
};
pub use retention::{select_for_pruning, RetentionPolicy};
pub use types::{
    AgentState, Checkpoint, CheckpointPhase, CheckpointType, MailboxCursor, OperationalContext,
    TaskRef, CHECKPOINT_SCHEMA_VERSION,
};
