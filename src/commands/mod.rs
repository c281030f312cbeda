pub mod checkpoint;
pub mod drift;
pub mod task;
