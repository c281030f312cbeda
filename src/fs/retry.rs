//! Retry with exponential backoff for filesystem operations
//!
//! Every I/O call site in the crate goes through [`RetryPolicy::run`], so the
//! retry budget is one tunable value rather than loops scattered per caller.

use rand::Rng;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::errors::{ErrorKind, Result, StoreError};

/// Windows `ERROR_SHARING_VIOLATION` and `ERROR_LOCK_VIOLATION`
const WINDOWS_SHARING_VIOLATIONS: [i32; 2] = [32, 33];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// A policy that tries once and never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (0-based), without jitter.
    ///
    /// Formula: base * 2^attempt, capped at max_backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_backoff
            .saturating_mul(multiplier)
            .min(self.max_backoff)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// Upper bound on total sleep time across all retries.
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|a| self.backoff(a) + self.jitter)
            .sum()
    }

    /// Run `f`, retrying transient I/O errors.
    ///
    /// Non-transient errors are returned immediately as `StoreError::Io`.
    /// When transient errors persist past `max_attempts` the last one is
    /// returned as `StoreError::Exhausted`.
    pub fn run<T, F>(&self, op: &'static str, path: &Path, mut f: F) -> Result<T>
    where
        F: FnMut() -> io::Result<T>,
    {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            op,
                            path = %path.display(),
                            attempts = attempt + 1,
                            "recovered after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !is_transient(&e) => {
                    return Err(StoreError::io(op, path, e));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            op,
                            path = %path.display(),
                            attempts = attempt,
                            error = %e,
                            "retries exhausted"
                        );
                        return Err(StoreError::Exhausted {
                            op,
                            path: path.to_path_buf(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = self.delay(attempt - 1);
                    tracing::debug!(
                        op,
                        kind = %ErrorKind::TransientIo,
                        path = %path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient I/O error, backing off"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

/// Whether an I/O error is worth retrying.
///
/// `NotFound` is included because a reader can race the rename step of a
/// concurrent atomic write. `PermissionDenied` only counts on Windows, where
/// renaming over a file another process has open reports it.
pub fn is_transient(err: &io::Error) -> bool {
    if cfg!(windows) {
        if let Some(code) = err.raw_os_error() {
            if WINDOWS_SHARING_VIOLATIONS.contains(&code) {
                return true;
            }
        }
        if err.kind() == io::ErrorKind::PermissionDenied {
            return true;
        }
    }
    matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    )
}
