//! Runtime configuration
//!
//! One `Config` is built at startup (from `config.toml` under the store root,
//! then environment overrides) and handed to every store and manager
//! constructor. Nothing here is global.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, StoreError};

/// Default root directory for all persisted state
pub const DEFAULT_ROOT: &str = ".waypoint";

/// File name of the optional configuration file inside the root
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 50,
            max_backoff_ms: 2_000,
            jitter_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    pub lock_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            poll_interval_ms: 20,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    /// Propagate corrupt-store errors from updates instead of soft-failing
    pub fail_on_corrupt: bool,
}

/// Upper bound for `recovery_retention_days` (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const MAX_EXPIRY_HOURS: i64 = 876_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    pub routine_keep_count: usize,
    pub recovery_retention_days: i64,
    /// Fallback expiry for unreleased pre-operation checkpoints. `None` keeps
    /// them until released.
    pub pre_operation_expiry_hours: Option<i64>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            routine_keep_count: 3,
            recovery_retention_days: 7,
            pre_operation_expiry_hours: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DriftConfig {
    pub max_cycles: u64,
    pub max_error_rate: f64,
    pub max_escalations: u32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            max_cycles: 50,
            max_error_rate: 0.25,
            max_escalations: 3,
        }
    }
}

/// Complete configuration for a waypoint root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub root: PathBuf,
    pub retry: RetryConfig,
    pub locks: LockConfig,
    pub tasks: TaskConfig,
    pub checkpoints: CheckpointConfig,
    pub drift: DriftConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            retry: RetryConfig::default(),
            locks: LockConfig::default(),
            tasks: TaskConfig::default(),
            checkpoints: CheckpointConfig::default(),
            drift: DriftConfig::default(),
        }
    }
}

impl Config {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load `<root>/config.toml` if present, apply environment overrides and
    /// validate. The root passed in wins over any `root` in the file and over
    /// `WAYPOINT_ROOT`; callers resolve that variable before choosing `root`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut config = Self::from_file(&root.join(CONFIG_FILE))?.unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.root = root;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file, returning `None` when it does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(path).map_err(|e| StoreError::io("read config", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Ok(Some(config))
    }

    /// Apply `WAYPOINT_*` overrides using `lookup` to fetch variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("WAYPOINT_ROOT") {
            self.root = PathBuf::from(root);
        }
        override_parsed(&lookup, "WAYPOINT_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        override_parsed(
            &lookup,
            "WAYPOINT_BASE_BACKOFF_MS",
            &mut self.retry.base_backoff_ms,
        )?;
        override_parsed(
            &lookup,
            "WAYPOINT_MAX_BACKOFF_MS",
            &mut self.retry.max_backoff_ms,
        )?;
        override_parsed(
            &lookup,
            "WAYPOINT_LOCK_TIMEOUT_MS",
            &mut self.locks.lock_timeout_ms,
        )?;
        override_parsed(
            &lookup,
            "WAYPOINT_ROUTINE_KEEP_COUNT",
            &mut self.checkpoints.routine_keep_count,
        )?;
        override_parsed(
            &lookup,
            "WAYPOINT_RECOVERY_RETENTION_DAYS",
            &mut self.checkpoints.recovery_retention_days,
        )?;
        override_parsed(
            &lookup,
            "WAYPOINT_FAIL_ON_CORRUPT",
            &mut self.tasks.fail_on_corrupt,
        )?;
        override_parsed(&lookup, "WAYPOINT_MAX_CYCLES", &mut self.drift.max_cycles)?;
        override_parsed(
            &lookup,
            "WAYPOINT_MAX_ERROR_RATE",
            &mut self.drift.max_error_rate,
        )?;
        override_parsed(
            &lookup,
            "WAYPOINT_MAX_ESCALATIONS",
            &mut self.drift.max_escalations,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(StoreError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(StoreError::Config(format!(
                "retry.base_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.base_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        if self.locks.poll_interval_ms == 0 {
            return Err(StoreError::Config(
                "locks.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.checkpoints.routine_keep_count == 0 {
            return Err(StoreError::Config(
                "checkpoints.routine_keep_count must be at least 1".to_string(),
            ));
        }
        if !(0..=MAX_RETENTION_DAYS).contains(&self.checkpoints.recovery_retention_days) {
            return Err(StoreError::Config(format!(
                "checkpoints.recovery_retention_days must be within 0..={MAX_RETENTION_DAYS}, got {}",
                self.checkpoints.recovery_retention_days
            )));
        }
        if let Some(hours) = self.checkpoints.pre_operation_expiry_hours {
            if !(1..=MAX_EXPIRY_HOURS).contains(&hours) {
                return Err(StoreError::Config(format!(
                    "checkpoints.pre_operation_expiry_hours must be within 1..={MAX_EXPIRY_HOURS}, got {hours}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.drift.max_error_rate) {
            return Err(StoreError::Config(format!(
                "drift.max_error_rate must be within 0.0..=1.0, got {}",
                self.drift.max_error_rate
            )));
        }
        Ok(())
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| StoreError::Config(format!("{key}={raw}: {e}")))?;
    }
    Ok(())
}
