//! Configuration file and environment overrides flowing into behaviour

use chrono::{Duration, Utc};
use serial_test::serial;
use std::fs;

use waypoint::checkpoints::{CheckpointManager, CheckpointType};
use waypoint::config::{Config, CONFIG_FILE, MAX_RETENTION_DAYS};
use waypoint::errors::ErrorKind;

use super::helpers::*;
use tempfile::TempDir;

fn write_routine(mgr: &CheckpointManager, count: u64) {
    let base = Utc::now() - Duration::hours(1);
    for i in 0..count {
        mgr.create_from_state_at(
            CheckpointType::Routine,
            sample_state(i),
            base + Duration::seconds(i as i64),
        )
        .expect("Should write checkpoint");
    }
}

#[test]
#[serial]
fn test_config_file_sets_retention() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(CONFIG_FILE),
        "[checkpoints]\nroutine_keep_count = 4\n",
    )
    .unwrap();

    let config = Config::load(temp.path()).expect("Should load config");
    let mgr = CheckpointManager::new(&config, "agent-1").unwrap();
    write_routine(&mgr, 6);

    assert_eq!(mgr.list_checkpoints(CheckpointType::Routine).unwrap().len(), 4);
}

#[test]
#[serial]
fn test_env_overrides_config_file() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join(CONFIG_FILE),
        "[checkpoints]\nroutine_keep_count = 4\n",
    )
    .unwrap();

    std::env::set_var("WAYPOINT_ROUTINE_KEEP_COUNT", "2");
    let loaded = Config::load(temp.path());
    std::env::remove_var("WAYPOINT_ROUTINE_KEEP_COUNT");

    let mgr = CheckpointManager::new(&loaded.expect("Should load config"), "agent-1").unwrap();
    write_routine(&mgr, 5);
    assert_eq!(mgr.list_checkpoints(CheckpointType::Routine).unwrap().len(), 2);
}

#[test]
#[serial]
fn test_invalid_env_value_is_config_error() {
    let temp = TempDir::new().unwrap();

    std::env::set_var("WAYPOINT_MAX_ERROR_RATE", "1.5");
    let result = Config::load(temp.path());
    std::env::remove_var("WAYPOINT_MAX_ERROR_RATE");

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Config);
}

#[test]
#[serial]
fn test_oversized_retention_is_config_error() {
    let temp = TempDir::new().unwrap();

    std::env::set_var("WAYPOINT_RECOVERY_RETENTION_DAYS", "1000000000");
    let result = Config::load(temp.path());
    std::env::remove_var("WAYPOINT_RECOVERY_RETENTION_DAYS");

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Config);
}

#[test]
fn test_recovery_write_at_retention_limit() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.checkpoints.recovery_retention_days = MAX_RETENTION_DAYS;
    config.validate().expect("Limit should be accepted");

    let mgr = CheckpointManager::new(&config, "agent-1").unwrap();
    let path = mgr
        .create_from_state(CheckpointType::Recovery, sample_state(1))
        .expect("Should write recovery checkpoint");
    assert!(path.exists());
}
