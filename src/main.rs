use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use waypoint::config::{Config, DEFAULT_ROOT};
use waypoint::logging;

mod cli;

use cli::dispatch::dispatch;
use cli::types::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let root = cli
        .root
        .or_else(|| std::env::var_os("WAYPOINT_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
    let config = Config::load(&root)
        .with_context(|| format!("Failed to load configuration from {}", root.display()))?;
    tracing::debug!(root = %config.root.display(), "configuration loaded");

    dispatch(&config, cli.command)
}
