//! Error taxonomy shared by the store, task board and checkpoint layers.
//!
//! Every failure carries the path or id it concerns so a log line is enough to
//! diagnose it. `ErrorKind` gives callers a stable value to branch on.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retry-eligible I/O failure. Absorbed by the retry loop, which tags its
    /// backoff log lines with this kind; never returned to callers.
    TransientIo,
    /// Transient failures persisted past the retry budget
    Exhausted,
    /// Non-transient I/O failure
    Io,
    LockTimeout,
    CorruptStore,
    CorruptCheckpoint,
    InvalidStatus,
    Validation,
    NotFound,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Io => "io",
            ErrorKind::LockTimeout => "lock_timeout",
            ErrorKind::CorruptStore => "corrupt_store",
            ErrorKind::CorruptCheckpoint => "corrupt_checkpoint",
            ErrorKind::InvalidStatus => "invalid_status",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Config => "config",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{op} on {} gave up after {attempts} attempts: {source}", path.display())]
    Exhausted {
        op: &'static str,
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("{op} failed on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {waited:?} waiting for lock on {}{}", path.display(), describe_holder(holder))]
    LockTimeout {
        path: PathBuf,
        waited: Duration,
        holder: Option<String>,
    },

    #[error("corrupt task store {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("corrupt checkpoint {}: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("invalid status '{value}'. Valid values: {allowed}")]
    InvalidStatus { value: String, allowed: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn describe_holder(holder: &Option<String>) -> String {
    match holder {
        Some(h) => format!(" (held by {h})"),
        None => String::new(),
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Exhausted { .. } => ErrorKind::Exhausted,
            StoreError::Io { .. } => ErrorKind::Io,
            StoreError::LockTimeout { .. } => ErrorKind::LockTimeout,
            StoreError::CorruptStore { .. } => ErrorKind::CorruptStore,
            StoreError::CorruptCheckpoint { .. } => ErrorKind::CorruptCheckpoint,
            StoreError::InvalidStatus { .. } => ErrorKind::InvalidStatus,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the caller's own retry policy may reasonably try again.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::LockTimeout | ErrorKind::Exhausted
        )
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True when the underlying I/O error was a missing file.
    pub fn is_missing_file(&self) -> bool {
        match self {
            StoreError::Io { source, .. } | StoreError::Exhausted { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
