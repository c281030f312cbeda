//! Checkpoint lifecycle: retention, restore integrity and drift recovery

use chrono::{Duration, TimeZone, Utc};
use std::fs;

use waypoint::checkpoints::{AgentState, CheckpointManager, CheckpointType};
use waypoint::drift::{DriftMetrics, OutcomeWindow};
use waypoint::errors::ErrorKind;

use super::helpers::*;
use tempfile::TempDir;

fn manager(temp: &TempDir, agent: &str) -> CheckpointManager {
    CheckpointManager::new(&test_config(temp.path()), agent).expect("Should create manager")
}

#[test]
fn test_routine_retention_keeps_three_newest() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let base = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap();

    let mut written = Vec::new();
    for i in 0..5 {
        written.push(
            mgr.create_from_state_at(
                CheckpointType::Routine,
                sample_state(i),
                base + Duration::minutes(i as i64),
            )
            .expect("Should write checkpoint"),
        );
    }

    let remaining: Vec<_> = mgr
        .list_checkpoints(CheckpointType::Routine)
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .collect();
    assert_eq!(remaining, written[2..].to_vec());
    assert!(!written[0].exists());
    assert!(!written[1].exists());
}

#[test]
fn test_recovery_older_than_seven_days_is_pruned() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let now = Utc.with_ymd_and_hms(2026, 6, 20, 0, 0, 0).unwrap();

    let old = mgr
        .create_from_state_at(CheckpointType::Recovery, sample_state(1), now - Duration::days(10))
        .unwrap();
    let edge = mgr
        .create_from_state_at(CheckpointType::Recovery, sample_state(2), now - Duration::days(8))
        .unwrap();
    assert!(old.exists() && edge.exists());

    // Retention runs relative to each checkpoint's own creation time.
    let fresh = mgr
        .create_from_state_at(CheckpointType::Recovery, sample_state(3), now - Duration::days(1))
        .unwrap();
    assert!(!old.exists());
    assert!(edge.exists());

    let pruned = mgr.prune(CheckpointType::Recovery, now).unwrap();

    assert_eq!(pruned, vec![edge]);
    assert_eq!(
        mgr.latest_checkpoint(CheckpointType::Recovery).unwrap(),
        Some(fresh)
    );
}

#[test]
fn test_pre_operation_survives_until_released() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let long_ago = Utc::now() - Duration::days(90);

    let guard = mgr
        .create_from_state_at(CheckpointType::PreOperation, sample_state(1), long_ago)
        .unwrap();
    assert!(mgr.prune(CheckpointType::PreOperation, Utc::now()).unwrap().is_empty());
    assert!(mgr.stale_pre_operation(Utc::now()).unwrap().is_empty());
    assert!(guard.exists());

    mgr.release_pre_operation(&guard).unwrap();
    assert!(mgr
        .latest_checkpoint(CheckpointType::PreOperation)
        .unwrap()
        .is_none());
}

#[test]
fn test_pre_operation_fallback_expiry() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.checkpoints.pre_operation_expiry_hours = Some(24);
    let mgr = CheckpointManager::new(&config, "agent-1").unwrap();
    let now = Utc::now();

    let stale = mgr
        .create_from_state_at(
            CheckpointType::PreOperation,
            sample_state(1),
            now - Duration::hours(48),
        )
        .unwrap();
    assert_eq!(mgr.stale_pre_operation(now).unwrap(), vec![stale.clone()]);
    assert_eq!(mgr.prune(CheckpointType::PreOperation, now).unwrap(), vec![stale]);
}

#[test]
fn test_restore_roundtrip_and_tamper_detection() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let state = sample_state(7);
    let path = mgr
        .create_checkpoint(CheckpointType::Routine, &state)
        .unwrap();

    let mut restored: Option<AgentState> = None;
    mgr.restore_checkpoint(&path, &mut restored).unwrap();
    assert_eq!(restored.as_ref(), Some(&state));

    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replace("goal 7", "goal 8")).unwrap();

    let mut untouched: Option<AgentState> = None;
    let err = mgr.restore_checkpoint(&path, &mut untouched).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptCheckpoint);
    assert!(untouched.is_none());
}

#[test]
fn test_unknown_field_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let path = mgr
        .create_from_state(CheckpointType::Routine, sample_state(1))
        .unwrap();
    let content = fs::read_to_string(&path).unwrap();
    fs::write(&path, content.replacen('{', "{\"extra\": 1,", 1)).unwrap();

    let err = mgr.load_checkpoint(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptCheckpoint);
}

#[test]
fn test_agents_are_isolated() {
    let temp = TempDir::new().unwrap();
    let a = manager(&temp, "agent-a");
    let b = manager(&temp, "agent-b");
    a.create_from_state(CheckpointType::Routine, sample_state(1))
        .unwrap();

    assert!(b.latest_checkpoint(CheckpointType::Routine).unwrap().is_none());
    assert!(CheckpointManager::new(&test_config(temp.path()), "../escape").is_err());
}

#[test]
fn test_drift_recovery_from_rolling_window() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let now = Utc::now();
    let clean = sample_state(1);
    let routine = mgr
        .create_from_state_at(CheckpointType::Routine, clean.clone(), now - Duration::minutes(30))
        .unwrap();

    let mut window = OutcomeWindow::new(10);
    for i in 0..10 {
        if i % 2 == 0 {
            window.record_failure();
        } else {
            window.record_success();
        }
    }
    let metrics = window.metrics(12, 0);
    assert!(mgr.detect_drift(&metrics).is_drifting());

    let current = sample_state(99);
    let mut sink: Option<AgentState> = None;
    let outcome = mgr
        .recover_from_drift(&metrics, &current, &mut sink, now)
        .unwrap();

    assert_eq!(outcome.restored_from, Some(routine));
    assert_eq!(sink, Some(clean));

    let recovery = outcome.recovery_checkpoint.expect("Should take a recovery checkpoint");
    let mut snapshot: Option<AgentState> = None;
    mgr.restore_checkpoint(&recovery, &mut snapshot).unwrap();
    assert_eq!(snapshot, Some(current));
}

#[test]
fn test_cycle_threshold_boundary() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(&temp, "agent-1");
    let at = |cycles| DriftMetrics {
        cycles_since_checkpoint: cycles,
        ..DriftMetrics::default()
    };
    assert!(!mgr.detect_drift(&at(50)).is_drifting());
    assert!(mgr.detect_drift(&at(51)).is_drifting());
}
