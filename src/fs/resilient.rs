//! Crash-safe, retrying file primitives
//!
//! `ResilientStore` is the only code in the crate that touches data files
//! directly. Writes go to `<file>.tmp-<uuid>` and are renamed into place, so a
//! reader sees either the old content or the new content, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::errors::{Result, StoreError};
use crate::fs::locking::FileLock;
use crate::fs::retry::RetryPolicy;

/// Chunk size for streamed reads and writes
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Marker embedded in temp file names
pub const TMP_MARKER: &str = ".tmp-";

/// Suffix of the backup copy kept by [`ResilientStore::write_with_backup`]
pub const BACKUP_SUFFIX: &str = ".bak";

/// Path of the backup copy for `path`.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Whether `path` is a temp file left by an atomic write.
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(TMP_MARKER))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!("{TMP_MARKER}{}", uuid::Uuid::new_v4().simple()));
    PathBuf::from(name)
}

#[derive(Debug, Clone)]
pub struct ResilientStore {
    retry: RetryPolicy,
    lock_timeout: Duration,
    lock_poll: Duration,
}

impl Default for ResilientStore {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ResilientStore {
    pub fn new(retry: RetryPolicy, lock_timeout: Duration) -> Self {
        Self {
            retry,
            lock_timeout,
            lock_poll: Duration::from_millis(20),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config.retry),
            lock_timeout: config.locks.timeout(),
            lock_poll: config.locks.poll_interval(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Read the whole file in chunks, retrying transient errors.
    pub fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        self.retry.run("read", path, || read_chunked(path))
    }

    /// Read the file if it exists. Absence is an expected state here, so a
    /// missing file is answered immediately instead of being retried.
    pub fn read_if_exists(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        if !path.exists() {
            return Ok(None);
        }
        match self.read_all(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_missing_file() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write `bytes` to `path` atomically via temp file + rename.
    ///
    /// If the process dies before the rename, `path` is untouched and only an
    /// orphaned temp file remains.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.retry
                    .run("create dir", parent, || fs::create_dir_all(parent))?;
            }
        }
        self.retry.run("atomic write", path, || {
            let tmp = temp_path_for(path);
            let result = write_chunked(&tmp, bytes).and_then(|_| fs::rename(&tmp, path));
            if result.is_err() {
                let _ = fs::remove_file(&tmp);
            }
            result
        })?;
        sync_parent(path);
        Ok(())
    }

    /// Copy the current content to `<path>.bak`, then write atomically.
    ///
    /// A failed backup is logged and does not stop the write.
    pub fn write_with_backup(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if path.exists() {
            let backup = backup_path_for(path);
            if let Err(e) = self.retry.run("backup", path, || fs::copy(path, &backup)) {
                tracing::warn!(
                    path = %path.display(),
                    kind = %e.kind(),
                    error = %e,
                    "backup before overwrite failed, continuing"
                );
            }
        }
        self.write_atomic(path, bytes)
    }

    /// Append a single record to an append-only file under its lock.
    pub fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let _lock = self.lock(path)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io("create dir", parent, e))?;
            }
        }
        let mut record = line.trim_end_matches('\n').to_string();
        record.push('\n');
        self.retry.run("append", path, || {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(record.as_bytes())?;
            file.sync_data()
        })
    }

    /// Delete a file; a missing file counts as deleted.
    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(_) => self.retry.run("remove", path, || match fs::remove_file(path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }),
        }
    }

    /// Acquire the advisory lock guarding `path` with the configured timeout.
    pub fn lock(&self, path: &Path) -> Result<FileLock> {
        self.lock_with_timeout(path, self.lock_timeout)
    }

    pub fn lock_with_timeout(&self, path: &Path, timeout: Duration) -> Result<FileLock> {
        FileLock::acquire_with_poll(path, timeout, self.lock_poll)
    }
}

fn read_chunked(path: &Path) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let hint = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut content = Vec::with_capacity(hint);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        content.extend_from_slice(&chunk[..n]);
    }
    Ok(content)
}

fn write_chunked(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    for chunk in bytes.chunks(CHUNK_SIZE) {
        writer.write_all(chunk)?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// Best effort fsync of the parent directory so the rename itself is durable.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(dir) = path.parent().and_then(|p| File::open(p).ok()) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
