//! Per-type checkpoint retention
//!
//! - Routine: keep the newest `routine_keep_count`
//! - Recovery: keep those younger than `recovery_retention_days`
//! - PreOperation: kept until released; optionally expired after
//!   `pre_operation_expiry_hours`

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

use super::types::CheckpointType;
use crate::config::CheckpointConfig;
use crate::errors::Result;
use crate::fs::checkpoints::{list_checkpoint_files, parse_stamp};
use crate::fs::resilient::ResilientStore;

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub routine_keep_count: usize,
    pub recovery_max_age: Duration,
    pub pre_operation_expiry: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&CheckpointConfig::default())
    }
}

impl RetentionPolicy {
    pub fn from_config(config: &CheckpointConfig) -> Self {
        Self {
            routine_keep_count: config.routine_keep_count.max(1),
            recovery_max_age: Duration::try_days(config.recovery_retention_days)
                .unwrap_or(Duration::MAX),
            pre_operation_expiry: config
                .pre_operation_expiry_hours
                .map(|h| Duration::try_hours(h).unwrap_or(Duration::MAX)),
        }
    }
}

/// Files (oldest first) that the policy would delete as of `now`.
pub fn select_for_pruning(
    files: &[PathBuf],
    kind: CheckpointType,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<PathBuf> {
    match kind {
        CheckpointType::Routine => {
            let excess = files.len().saturating_sub(policy.routine_keep_count);
            files[..excess].to_vec()
        }
        CheckpointType::Recovery => older_than(files, now, policy.recovery_max_age),
        CheckpointType::PreOperation => expired_pre_operation(files, policy, now),
    }
}

/// Unreleased pre-operation checkpoints past the fallback expiry.
pub fn expired_pre_operation(
    files: &[PathBuf],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<PathBuf> {
    match policy.pre_operation_expiry {
        Some(expiry) => older_than(files, now, expiry),
        None => Vec::new(),
    }
}

/// An age reaching past the representable range keeps everything.
fn older_than(files: &[PathBuf], now: DateTime<Utc>, max_age: Duration) -> Vec<PathBuf> {
    let Some(cutoff) = now.checked_sub_signed(max_age) else {
        return Vec::new();
    };
    files
        .iter()
        .filter(|p| parse_stamp(p).is_some_and(|created| created < cutoff))
        .cloned()
        .collect()
}

/// Delete whatever the policy selects in `dir`, logging each deletion.
///
/// Returns the deleted paths. A failed deletion is logged and skipped so one
/// stuck file cannot block pruning of the rest.
pub fn apply_retention(
    store: &ResilientStore,
    dir: &Path,
    kind: CheckpointType,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>> {
    let files = list_checkpoint_files(dir)?;
    let mut pruned = Vec::new();
    for path in select_for_pruning(&files, kind, policy, now) {
        match store.remove(&path) {
            Ok(()) => {
                tracing::info!(kind = %kind, path = %path.display(), "pruned checkpoint");
                pruned.push(path);
            }
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    path = %path.display(),
                    error = %e,
                    "failed to prune checkpoint"
                );
            }
        }
    }
    Ok(pruned)
}
