//! Shared test helpers for task board and checkpoint integration tests

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use waypoint::checkpoints::{AgentState, MailboxCursor, OperationalContext, TaskRef};
use waypoint::config::Config;

/// Config rooted at `root` with short backoffs so failing paths stay fast
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::with_root(root);
    config.retry.max_attempts = 3;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config.retry.jitter_ms = 1;
    config.locks.lock_timeout_ms = 30_000;
    config.locks.poll_interval_ms = 2;
    config
}

/// Hex SHA-256 of a file's bytes
pub fn hash_file(path: &Path) -> String {
    let bytes = fs::read(path).expect("Failed to read file for hashing");
    hex::encode(Sha256::digest(&bytes))
}

pub fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .expect("Failed to read mtime")
}

/// A representative agent state; `n` varies every field
pub fn sample_state(n: u64) -> AgentState {
    AgentState {
        current_task: Some(TaskRef {
            task_id: format!("task-{n}"),
            status: "in_progress".to_string(),
            progress: 0.25,
            note: None,
        }),
        mailbox: MailboxCursor {
            last_message_id: Some(format!("msg-{n}")),
            processed_count: n * 10,
            updated_at: None,
        },
        context: OperationalContext {
            goals: vec![format!("goal {n}")],
            constraints: vec!["stay within budget".to_string()],
            recent_decisions: vec![],
        },
        memory: serde_json::json!({ "iteration": n }),
    }
}
