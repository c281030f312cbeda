//! Concurrent writers sharing one task store
//!
//! Each thread builds its own `TaskStore`, the same way separate agent
//! processes would, so all coordination goes through the file locks.

use std::sync::{Arc, Barrier};
use std::thread;

use waypoint::tasks::{NewTask, TaskStatus, TaskStore, UpdateOptions};

use super::helpers::*;
use tempfile::TempDir;

const WRITERS: usize = 8;

#[test]
fn test_distinct_tasks_updated_concurrently_are_all_kept() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let store = TaskStore::new(&config);
    for i in 0..WRITERS {
        store
            .add_task("board", NewTask::new(format!("t{i}")), "producer")
            .expect("Should add task");
    }

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = TaskStore::new(&config);
                let opts = UpdateOptions::by(format!("agent-{i}"));
                barrier.wait();
                store
                    .update_task_status("board", &format!("t{i}"), "in_progress", &opts)
                    .expect("Update should succeed")
                    && store
                        .update_task_status("board", &format!("t{i}"), "completed", &opts)
                        .expect("Update should succeed")
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("Writer thread panicked"));
    }

    let tasks = store.read_tasks("board").expect("Store should stay valid JSON");
    assert_eq!(tasks.len(), WRITERS);
    for task in &tasks {
        assert_eq!(task.status, TaskStatus::Completed, "lost update on {}", task.task_id);
        assert_eq!(task.history.len(), 2);
    }
    assert_eq!(
        store.transaction_log().read_all().unwrap().len(),
        WRITERS * 3
    );
    assert!(store.reconcile("board").unwrap().is_consistent());
}

#[test]
fn test_same_task_updates_form_a_consistent_chain() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let store = TaskStore::new(&config);
    store
        .add_task("board", NewTask::new("shared"), "producer")
        .expect("Should add task");

    let statuses = ["ready", "in_progress", "failed", "rescue_pending"];
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = TaskStore::new(&config);
                let opts = UpdateOptions::by(format!("agent-{i}"));
                barrier.wait();
                for round in 0..3 {
                    let status = statuses[(i + round) % statuses.len()];
                    store
                        .update_task_status("board", "shared", status, &opts)
                        .expect("Update should succeed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Writer thread panicked");
    }

    let task = store
        .read_tasks("board")
        .expect("Store should stay valid JSON")
        .into_iter()
        .next()
        .expect("Task should survive");

    let entries = store
        .transaction_log()
        .entries_for("board", "shared")
        .unwrap();
    assert_eq!(entries[0].old_status, None);
    for pair in entries.windows(2) {
        assert_eq!(
            pair[1].old_status,
            Some(pair[0].new_status),
            "log out of lock order"
        );
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }

    // Every logged transition is in the history, in the same order.
    assert_eq!(task.history.len(), entries.len() - 1);
    for (entry, history) in entries[1..].iter().zip(&task.history) {
        assert_eq!(Some(history.old_status), entry.old_status);
        assert_eq!(history.new_status, entry.new_status);
        assert_eq!(history.actor, entry.actor);
    }
    assert_eq!(entries.last().map(|e| e.new_status), Some(task.status));

    let failures = task
        .history
        .iter()
        .filter(|h| h.new_status.counts_as_failure())
        .count() as u32;
    assert_eq!(task.failure_count, failures);
}

#[test]
fn test_writers_on_different_stores_share_one_log() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());

    let handles: Vec<_> = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(|name| {
            let config = config.clone();
            thread::spawn(move || {
                let store = TaskStore::new(&config);
                for i in 0..5 {
                    store
                        .add_task(name, NewTask::new(format!("{name}-{i}")), "producer")
                        .expect("Should add task");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Writer thread panicked");
    }

    let store = TaskStore::new(&config);
    let entries = store
        .transaction_log()
        .read_all()
        .expect("Interleaved appends should leave whole lines");
    assert_eq!(entries.len(), 15);
    for name in ["alpha", "beta", "gamma"] {
        assert_eq!(store.read_tasks(name).unwrap().len(), 5);
    }
}
