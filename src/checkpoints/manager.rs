//! Checkpoint creation, restore and drift-driven recovery for one agent

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use super::retention::{apply_retention, expired_pre_operation, RetentionPolicy};
use super::types::{AgentState, Checkpoint, CheckpointPhase, CheckpointType};
use crate::config::Config;
use crate::drift::{DriftBreach, DriftDetector, DriftMetrics, DriftReport};
use crate::errors::{ErrorKind, Result, StoreError};
use crate::fs::checkpoints::{list_checkpoint_files, parse_stamp, type_dir, unique_checkpoint_path};
use crate::fs::resilient::ResilientStore;
use crate::validation::validate_id;

/// Supplies the agent's current state when a checkpoint is taken.
pub trait StateSource {
    fn capture(&self) -> Result<AgentState>;
}

/// Receives a restored state. Only called once the checkpoint has been fully
/// validated.
pub trait StateSink {
    fn inject(&mut self, state: AgentState);
}

impl StateSource for AgentState {
    fn capture(&self) -> Result<AgentState> {
        Ok(self.clone())
    }
}

impl StateSink for Option<AgentState> {
    fn inject(&mut self, state: AgentState) {
        *self = Some(state);
    }
}

/// A checkpoint file found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointEntry {
    pub path: PathBuf,
    pub kind: CheckpointType,
    pub created_at: DateTime<Utc>,
}

/// What [`CheckpointManager::recover_from_drift`] did
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub breaches: Vec<DriftBreach>,
    /// Recovery checkpoint taken before restoring
    pub recovery_checkpoint: Option<PathBuf>,
    /// Routine checkpoint the agent was restored from
    pub restored_from: Option<PathBuf>,
    /// Routine checkpoints skipped because they failed validation
    pub skipped: Vec<PathBuf>,
}

impl RecoveryOutcome {
    pub fn recovered(&self) -> bool {
        self.restored_from.is_some()
    }
}

/// Creates, restores and prunes checkpoints owned by a single agent.
///
/// Checkpoint files are single-owner, so no locking is needed here; crash
/// safety comes from `ResilientStore::write_atomic`.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    agent_id: String,
    root: PathBuf,
    store: ResilientStore,
    retention: RetentionPolicy,
    detector: DriftDetector,
}

impl CheckpointManager {
    pub fn new(config: &Config, agent_id: &str) -> Result<Self> {
        validate_id(agent_id)?;
        Ok(Self {
            agent_id: agent_id.to_string(),
            root: config.checkpoints_dir(),
            store: ResilientStore::from_config(config),
            retention: RetentionPolicy::from_config(&config.checkpoints),
            detector: DriftDetector::from_config(&config.drift),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    fn dir(&self, kind: CheckpointType) -> PathBuf {
        type_dir(&self.root, &self.agent_id, kind)
    }

    /// Capture state from `source` and write a checkpoint of `kind`.
    pub fn create_checkpoint(
        &self,
        kind: CheckpointType,
        source: &dyn StateSource,
    ) -> Result<PathBuf> {
        let state = source.capture()?;
        self.create_from_state_at(kind, state, Utc::now())
    }

    pub fn create_from_state(&self, kind: CheckpointType, state: AgentState) -> Result<PathBuf> {
        self.create_from_state_at(kind, state, Utc::now())
    }

    /// Write a checkpoint stamped `now` and apply the type's retention.
    ///
    /// Retention failures are logged, not returned: the checkpoint itself is
    /// already durable at that point.
    ///
    /// A back-dated `now` can make the new checkpoint the first one retention
    /// selects. It is then deleted straight away and the returned path no
    /// longer exists; callers writing historical checkpoints should check.
    pub fn create_from_state_at(
        &self,
        kind: CheckpointType,
        state: AgentState,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let phase = CheckpointPhase::Requested.advance(CheckpointPhase::Serializing)?;

        let dir = self.dir(kind);
        let (stamp, path) = unique_checkpoint_path(&dir, now);
        let checkpoint = Checkpoint::new(&self.agent_id, kind, &stamp, now, state)?;
        let bytes = serde_json::to_vec_pretty(&checkpoint).map_err(|e| {
            StoreError::Validation(format!("checkpoint {} not serializable: {e}", checkpoint.id))
        })?;

        if let Err(e) = self.store.write_atomic(&path, &bytes) {
            tracing::error!(
                agent_id = %self.agent_id,
                kind = %kind,
                phase = ?phase,
                error_kind = %e.kind(),
                error = %e,
                "checkpoint write failed"
            );
            return Err(e);
        }
        let phase = phase.advance(CheckpointPhase::Written)?;
        tracing::info!(
            agent_id = %self.agent_id,
            kind = %kind,
            path = %path.display(),
            "checkpoint written"
        );

        match apply_retention(&self.store, &dir, kind, &self.retention, now) {
            Ok(pruned) if pruned.contains(&path) => {
                phase.advance(CheckpointPhase::Pruned)?;
                tracing::warn!(
                    agent_id = %self.agent_id,
                    kind = %kind,
                    path = %path.display(),
                    "new checkpoint removed by its own retention pass"
                );
            }
            Ok(_) => {
                phase.advance(CheckpointPhase::Active)?;
            }
            Err(e) => tracing::warn!(
                agent_id = %self.agent_id,
                kind = %kind,
                error = %e,
                "retention pass failed"
            ),
        }
        Ok(path)
    }

    /// Read and fully validate a checkpoint without restoring it.
    pub fn load_checkpoint(&self, path: &Path) -> Result<Checkpoint> {
        let bytes = self.store.read_all(path)?;
        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptCheckpoint {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if let Some(reason) = checkpoint.integrity_problem() {
            return Err(StoreError::CorruptCheckpoint {
                path: path.to_path_buf(),
                reason,
            });
        }
        if checkpoint.agent_id != self.agent_id {
            return Err(StoreError::Validation(format!(
                "checkpoint {} belongs to agent '{}', not '{}'",
                path.display(),
                checkpoint.agent_id,
                self.agent_id
            )));
        }
        Ok(checkpoint)
    }

    /// Validate the checkpoint at `path` and hand its state to `sink`.
    ///
    /// All-or-nothing: on any error the sink is not called, so the agent's
    /// in-memory state is left as it was.
    pub fn restore_checkpoint(&self, path: &Path, sink: &mut dyn StateSink) -> Result<Checkpoint> {
        let checkpoint = match self.load_checkpoint(path) {
            Ok(cp) => cp,
            Err(e) => {
                tracing::error!(
                    agent_id = %self.agent_id,
                    path = %path.display(),
                    error_kind = %e.kind(),
                    error = %e,
                    "checkpoint restore rejected"
                );
                return Err(e);
            }
        };
        sink.inject(checkpoint.state.clone());
        tracing::info!(
            agent_id = %self.agent_id,
            kind = %checkpoint.kind,
            path = %path.display(),
            "checkpoint restored"
        );
        Ok(checkpoint)
    }

    /// Checkpoints of `kind`, oldest first.
    pub fn list_checkpoints(&self, kind: CheckpointType) -> Result<Vec<CheckpointEntry>> {
        Ok(list_checkpoint_files(&self.dir(kind))?
            .into_iter()
            .filter_map(|path| {
                parse_stamp(&path).map(|created_at| CheckpointEntry {
                    path,
                    kind,
                    created_at,
                })
            })
            .collect())
    }

    /// Most recent checkpoint of `kind`; `None` when there is none.
    pub fn latest_checkpoint(&self, kind: CheckpointType) -> Result<Option<PathBuf>> {
        Ok(list_checkpoint_files(&self.dir(kind))?.pop())
    }

    /// Delete a pre-operation checkpoint once its guarded operation succeeded.
    ///
    /// `path` may be relative or absolute; it is compared with the agent's
    /// pre-operation directory after canonicalization.
    pub fn release_pre_operation(&self, path: &Path) -> Result<()> {
        let dir = self.dir(CheckpointType::PreOperation);
        if !same_dir(path.parent(), &dir) {
            return Err(StoreError::Validation(format!(
                "{} is not a pre-operation checkpoint of agent '{}'",
                path.display(),
                self.agent_id
            )));
        }
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "pre-operation checkpoint {}",
                path.display()
            )));
        }
        self.store.remove(path)?;
        tracing::info!(
            agent_id = %self.agent_id,
            path = %path.display(),
            "pre-operation checkpoint released"
        );
        Ok(())
    }

    /// Apply the retention rule for `kind` as of `now`.
    pub fn prune(&self, kind: CheckpointType, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        apply_retention(&self.store, &self.dir(kind), kind, &self.retention, now)
    }

    /// Pre-operation checkpoints older than the configured expiry that were
    /// never released. Empty when no expiry is configured.
    pub fn stale_pre_operation(&self, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let files = list_checkpoint_files(&self.dir(CheckpointType::PreOperation))?;
        let stale = expired_pre_operation(&files, &self.retention, now);
        for path in &stale {
            tracing::warn!(
                agent_id = %self.agent_id,
                path = %path.display(),
                "unreleased pre-operation checkpoint past expiry"
            );
        }
        Ok(stale)
    }

    pub fn detect_drift(&self, metrics: &DriftMetrics) -> DriftReport {
        self.detector.evaluate(metrics)
    }

    /// On drift, take a recovery checkpoint and restore the newest routine
    /// checkpoint that validates, falling back to older ones.
    pub fn recover_from_drift(
        &self,
        metrics: &DriftMetrics,
        source: &dyn StateSource,
        sink: &mut dyn StateSink,
        now: DateTime<Utc>,
    ) -> Result<RecoveryOutcome> {
        let report = self.detect_drift(metrics);
        let mut outcome = RecoveryOutcome {
            breaches: report.breaches.clone(),
            recovery_checkpoint: None,
            restored_from: None,
            skipped: Vec::new(),
        };
        if !report.is_drifting() {
            return Ok(outcome);
        }

        tracing::warn!(
            agent_id = %self.agent_id,
            breaches = %report,
            "drift detected, starting recovery"
        );
        let state = source.capture()?;
        outcome.recovery_checkpoint =
            Some(self.create_from_state_at(CheckpointType::Recovery, state, now)?);

        let mut routine = list_checkpoint_files(&self.dir(CheckpointType::Routine))?;
        while let Some(path) = routine.pop() {
            match self.restore_checkpoint(&path, sink) {
                Ok(_) => {
                    outcome.restored_from = Some(path);
                    break;
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::CorruptCheckpoint | ErrorKind::Validation
                    ) =>
                {
                    outcome.skipped.push(path);
                }
                Err(e) => return Err(e),
            }
        }

        if outcome.restored_from.is_none() {
            tracing::warn!(agent_id = %self.agent_id, "no restorable routine checkpoint found");
        }
        Ok(outcome)
    }
}

/// Whether `parent` names `dir`, resolving symlinks and relative paths when
/// both exist on disk.
fn same_dir(parent: Option<&Path>, dir: &Path) -> bool {
    let Some(parent) = parent else {
        return false;
    };
    match (fs::canonicalize(parent), fs::canonicalize(dir)) {
        (Ok(a), Ok(b)) => a == b,
        _ => parent == dir,
    }
}
