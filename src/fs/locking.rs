//! Advisory file locks with bounded waits
//!
//! Locks are taken with `fs2` on a sibling `<file>.lock`, never on the data
//! file itself: atomic writes replace the data file's inode, which would
//! silently orphan a lock held on it.
//!
//! Advisory locks are cooperative - every writer must go through
//! [`FileLock::acquire`] for the locking to be effective.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::errors::{Result, StoreError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Path of the lock file guarding `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive advisory lock guarding a data file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
    acquired_after: Duration,
}

impl FileLock {
    /// Acquire the lock guarding `path`, waiting up to `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        Self::acquire_with_poll(path, timeout, DEFAULT_POLL_INTERVAL)
    }

    /// Acquire with an explicit poll interval between attempts.
    ///
    /// Returns `StoreError::LockTimeout` (with the current holder, when it
    /// can be read) if the lock is still held once `timeout` elapses.
    pub fn acquire_with_poll(path: &Path, timeout: Duration, poll: Duration) -> Result<Self> {
        let lock_path = lock_path_for(path);
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| StoreError::io("create lock dir", parent, e))?;
            }
        }

        #[allow(clippy::suspicious_open_options)]
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io("open lock", &lock_path, e))?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        let holder = read_holder(&lock_path);
                        tracing::warn!(
                            path = %path.display(),
                            waited_ms = waited.as_millis() as u64,
                            holder = holder.as_deref().unwrap_or("unknown"),
                            "lock acquisition timed out"
                        );
                        return Err(StoreError::LockTimeout {
                            path: lock_path,
                            waited,
                            holder,
                        });
                    }
                    let remaining = timeout.saturating_sub(waited);
                    std::thread::sleep(poll.min(remaining).max(Duration::from_millis(1)));
                }
                Err(e) => return Err(StoreError::io("lock", &lock_path, e)),
            }
        }

        let mut lock = Self {
            file,
            lock_path,
            acquired_after: start.elapsed(),
        };
        lock.record_holder();
        tracing::trace!(
            path = %path.display(),
            waited_ms = lock.acquired_after.as_millis() as u64,
            "lock acquired"
        );
        Ok(lock)
    }

    /// Write our pid and acquisition time into the lock file so a waiter
    /// that times out can report who holds it. Best effort.
    fn record_holder(&mut self) {
        let stamp = format!(
            "pid={} acquired={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        let written = self
            .file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(stamp.as_bytes()))
            .and_then(|_| self.file.flush());
        if let Err(e) = written {
            tracing::debug!(
                path = %self.lock_path.display(),
                error = %e,
                "could not record lock holder"
            );
        }
    }

    /// Holder description recorded in the lock file, if any.
    pub fn holder(path: &Path) -> Option<String> {
        read_holder(&lock_path_for(path))
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// How long the caller waited before the lock was granted.
    pub fn waited(&self) -> Duration {
        self.acquired_after
    }

    /// Release the lock explicitly.
    pub fn release(self) {}
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The lock file itself stays: removing it would let a second process
        // lock a fresh inode while a third still waits on the old one.
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.lock_path.display(), error = %e, "failed to release lock");
        }
    }
}

fn read_holder(lock_path: &Path) -> Option<String> {
    let mut content = String::new();
    File::open(lock_path)
        .and_then(|mut f| f.read_to_string(&mut content))
        .ok()?;
    let trimmed = content.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_is_sibling() {
        let path = Path::new("/tmp/tasks/board.json");
        assert_eq!(
            lock_path_for(path),
            PathBuf::from("/tmp/tasks/board.json.lock")
        );
    }

    #[test]
    fn test_acquire_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("board.json");

        let lock = FileLock::acquire(&path, Duration::from_secs(1)).unwrap();
        assert!(lock.lock_path().exists());
        lock.release();

        // Re-acquire immediately after release
        let _again = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn test_contended_lock_times_out_with_holder() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("board.json");

        let _held = FileLock::acquire(&path, Duration::from_secs(1)).unwrap();
        let err = FileLock::acquire(&path, Duration::from_millis(100)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        match err {
            StoreError::LockTimeout { holder, waited, .. } => {
                assert!(waited >= Duration::from_millis(100));
                let holder = holder.expect("holder should be recorded");
                assert!(holder.contains(&format!("pid={}", std::process::id())));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_drop_releases() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("board.json");

        {
            let _lock = FileLock::acquire(&path, Duration::from_secs(1)).unwrap();
        }

        assert!(FileLock::acquire(&path, Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn test_lock_serializes_threads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("counter.json");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let _lock = FileLock::acquire(&path, Duration::from_secs(10)).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
