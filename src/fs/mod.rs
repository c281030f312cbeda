//! Filesystem layer: retrying primitives, atomic writes and advisory locks.

pub mod checkpoints;
pub mod locking;
pub mod resilient;
pub mod retry;

pub use locking::FileLock;
pub use resilient::ResilientStore;
pub use retry::RetryPolicy;
