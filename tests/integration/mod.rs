//! Integration tests for the task board and checkpoint lifecycle
//!
//! These tests drive the public API against real temp directories,
//! including multi-threaded writers sharing one store.

pub mod checkpoint_lifecycle;
pub mod concurrency;
pub mod config_env;
pub mod helpers;
pub mod task_scenarios;
