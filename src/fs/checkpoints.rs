//! Checkpoint file layout and directory scanning
//!
//! Checkpoints live at `checkpoints/<agent-id>/<type>/<timestamp>.json`. The
//! timestamp format sorts lexicographically in creation order, so listing a
//! directory and sorting file names yields oldest-to-newest.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checkpoints::CheckpointType;
use crate::errors::{Result, StoreError};
use crate::fs::resilient::is_temp_file;

/// Timestamp format used for checkpoint file names
pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";

/// Get the checkpoints directory for an agent
pub fn agent_dir(checkpoints_root: &Path, agent_id: &str) -> PathBuf {
    checkpoints_root.join(agent_id)
}

/// Get the directory holding one checkpoint type for an agent
pub fn type_dir(checkpoints_root: &Path, agent_id: &str, kind: CheckpointType) -> PathBuf {
    agent_dir(checkpoints_root, agent_id).join(kind.dir_name())
}

/// File-name stamp for a creation time
pub fn stamp_for(created_at: DateTime<Utc>) -> String {
    created_at.format(STAMP_FORMAT).to_string()
}

/// Recover the creation time from a checkpoint file name.
///
/// Accepts the collision suffix (`<stamp>-N.json`) produced when two
/// checkpoints share a timestamp.
pub fn parse_stamp(path: &Path) -> Option<DateTime<Utc>> {
    let stem = path.file_stem()?.to_str()?;
    let stamp = stem.split_once('-').map(|(s, _)| s).unwrap_or(stem);
    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some(naive.and_utc())
}

/// Pick an unused path for a checkpoint created at `created_at`.
pub fn unique_checkpoint_path(dir: &Path, created_at: DateTime<Utc>) -> (String, PathBuf) {
    let stamp = stamp_for(created_at);
    let first = dir.join(format!("{stamp}.json"));
    if !first.exists() {
        return (stamp, first);
    }
    let mut n = 1u32;
    loop {
        let candidate_stamp = format!("{stamp}-{n}");
        let candidate = dir.join(format!("{candidate_stamp}.json"));
        if !candidate.exists() {
            return (candidate_stamp, candidate);
        }
        n += 1;
    }
}

/// List checkpoint files in a type directory, oldest first.
///
/// Temp files from in-flight or crashed writes are skipped; a missing
/// directory lists as empty.
pub fn list_checkpoint_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io("list checkpoints", dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("list checkpoints", dir, e))?;
        let path = entry.path();
        if is_temp_file(&path) || path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if parse_stamp(&path).is_none() {
            tracing::warn!(
                path = %path.display(),
                "ignoring checkpoint with unrecognised file name"
            );
            continue;
        }
        files.push(path);
    }

    files.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    Ok(files)
}

/// (creation time, collision counter) so `-10` sorts after `-9`
fn sort_key(path: &Path) -> (Option<DateTime<Utc>>, u32) {
    let counter = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.split_once('-'))
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0);
    (parse_stamp(path), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_stamp_roundtrip() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let path = PathBuf::from(format!("{}.json", stamp_for(t)));
        assert_eq!(parse_stamp(&path), Some(t));
    }

    #[test]
    fn test_stamp_with_collision_suffix() {
        let t = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let path = PathBuf::from(format!("{}-3.json", stamp_for(t)));
        assert_eq!(parse_stamp(&path), Some(t));
    }

    #[test]
    fn test_unique_path_adds_suffix() {
        let temp = TempDir::new().unwrap();
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let (_, first) = unique_checkpoint_path(temp.path(), t);
        fs::write(&first, "{}").unwrap();
        let (stamp, second) = unique_checkpoint_path(temp.path(), t);

        assert_ne!(first, second);
        assert!(stamp.ends_with("-1"));
    }

    #[test]
    fn test_listing_skips_temp_and_foreign_files() {
        let temp = TempDir::new().unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();

        fs::write(temp.path().join(format!("{}.json", stamp_for(t2))), "{}").unwrap();
        fs::write(temp.path().join(format!("{}.json", stamp_for(t1))), "{}").unwrap();
        fs::write(
            temp.path()
                .join(format!("{}.json.tmp-abc", stamp_for(t1))),
            "{",
        )
        .unwrap();
        fs::write(temp.path().join("notes.txt"), "hi").unwrap();
        fs::write(temp.path().join("garbage.json"), "{}").unwrap();

        let files = list_checkpoint_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(parse_stamp(&files[0]), Some(t1));
        assert_eq!(parse_stamp(&files[1]), Some(t2));
    }

    #[test]
    fn test_missing_dir_lists_empty() {
        let temp = TempDir::new().unwrap();
        assert!(list_checkpoint_files(&temp.path().join("none"))
            .unwrap()
            .is_empty());
    }
}
