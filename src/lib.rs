pub mod checkpoints;
pub mod commands;
pub mod config;
pub mod drift;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod tasks;
pub mod validation;
