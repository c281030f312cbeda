//! Task board scenarios: no-op updates, corrupt stores, missing tasks,
//! invalid statuses and interrupted writes.

use std::fs;

use waypoint::errors::ErrorKind;
use waypoint::fs::resilient::backup_path_for;
use waypoint::tasks::{NewTask, TaskStatus, TaskStore, UpdateOptions};

use super::helpers::*;
use tempfile::TempDir;

fn seeded_store(temp: &TempDir) -> TaskStore {
    let store = TaskStore::new(&test_config(temp.path()));
    store
        .add_task("board", NewTask::new("build"), "producer")
        .expect("Should add build");
    store
        .add_task(
            "board",
            NewTask::new("deploy").with_dependencies(["build"]),
            "producer",
        )
        .expect("Should add deploy");
    store
}

#[test]
fn test_noop_update_leaves_file_and_history_alone() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    store
        .update_task_status("board", "build", "in_progress", &UpdateOptions::by("agent-1"))
        .expect("Should update");

    let path = store.store_path("board").unwrap();
    let hash_before = hash_file(&path);
    let mtime_before = mtime(&path);
    let log_before = store.transaction_log().read_all().unwrap().len();

    let changed = store
        .update_task_status("board", "build", "InProgress", &UpdateOptions::by("agent-1"))
        .expect("No-op update should succeed");

    assert!(changed);
    assert_eq!(hash_file(&path), hash_before);
    assert_eq!(mtime(&path), mtime_before);
    assert_eq!(store.transaction_log().read_all().unwrap().len(), log_before);
    let build = &store.read_tasks("board").unwrap()[0];
    assert_eq!(build.history.len(), 1);
}

#[test]
fn test_corrupt_store_is_reported_not_repaired() {
    let temp = TempDir::new().unwrap();
    let store = TaskStore::new(&test_config(temp.path()));
    let path = store.store_path("board").unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{not a list}").unwrap();

    let err = store.read_tasks("board").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptStore);

    let soft = store
        .update_task_status("board", "build", "completed", &UpdateOptions::default())
        .expect("Soft failure should not error");
    assert!(!soft);

    let hard = store
        .update_task_status(
            "board",
            "build",
            "completed",
            &UpdateOptions::default().fail_on_corrupt(true),
        )
        .unwrap_err();
    assert_eq!(hard.kind(), ErrorKind::CorruptStore);

    assert_eq!(fs::read_to_string(&path).unwrap(), "{not a list}");
    assert!(store.transaction_log().read_all().unwrap().is_empty());
}

#[test]
fn test_wrong_json_shape_is_corrupt() {
    let temp = TempDir::new().unwrap();
    let store = TaskStore::new(&test_config(temp.path()));
    let path = store.store_path("board").unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, r#"{"tasks": []}"#).unwrap();

    let err = store.read_tasks("board").unwrap_err();
    assert!(err.to_string().contains("expected a list"));
}

#[test]
fn test_missing_task_returns_false_without_writing() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let path = store.store_path("board").unwrap();
    let before = hash_file(&path);

    let updated = store
        .update_task_status("board", "ghost", "completed", &UpdateOptions::default())
        .expect("Missing task is not an error");

    assert!(!updated);
    assert_eq!(hash_file(&path), before);
}

#[test]
fn test_invalid_status_is_rejected_before_mutation() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let path = store.store_path("board").unwrap();
    let before = hash_file(&path);
    let log_before = store.transaction_log().read_all().unwrap().len();

    let err = store
        .update_task_status("board", "build", "BOGUS", &UpdateOptions::default())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    assert!(err.to_string().contains("BOGUS"));
    assert_eq!(hash_file(&path), before);
    assert_eq!(store.transaction_log().read_all().unwrap().len(), log_before);
}

#[test]
fn test_backup_holds_previous_version() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let path = store.store_path("board").unwrap();
    let before = fs::read(&path).unwrap();

    store
        .update_task_status("board", "build", "ready", &UpdateOptions::default())
        .unwrap();

    assert_eq!(fs::read(backup_path_for(&path)).unwrap(), before);
}

#[test]
fn test_interrupted_write_leaves_store_readable() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let path = store.store_path("board").unwrap();
    let before = hash_file(&path);

    // A writer that died between writing its temp file and renaming it.
    let orphan = path.with_file_name("board.json.tmp-deadbeef");
    fs::write(&orphan, "[{\"task_id\": \"half").unwrap();

    assert_eq!(hash_file(&path), before);
    assert_eq!(store.read_tasks("board").unwrap().len(), 2);
    assert!(store
        .update_task_status("board", "build", "ready", &UpdateOptions::default())
        .unwrap());
}

#[test]
fn test_dependency_flow_through_archive() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);

    let blocked = store.claim_task("board", "deploy", "agent-1", None).unwrap_err();
    assert_eq!(blocked.kind(), ErrorKind::Validation);

    let claimable: Vec<String> = store
        .claimable_tasks("board")
        .unwrap()
        .into_iter()
        .map(|t| t.task_id)
        .collect();
    assert_eq!(claimable, vec!["build"]);

    assert!(store.claim_task("board", "build", "agent-1", None).unwrap());
    store
        .update_task_status("board", "build", "completed", &UpdateOptions::by("agent-1"))
        .unwrap();
    let summary = store.archive_terminal("board", "janitor").unwrap();
    assert_eq!(summary.completed, vec!["build".to_string()]);

    assert!(store.claim_task("board", "deploy", "agent-2", None).unwrap());
    let deploy = &store.read_tasks("board").unwrap()[0];
    assert_eq!(deploy.status, TaskStatus::Claimed);
    assert_eq!(deploy.owner.as_deref(), Some("agent-2"));

    let report = store.reconcile("board").unwrap();
    assert!(report.is_consistent(), "unexpected divergence: {report:?}");
}
