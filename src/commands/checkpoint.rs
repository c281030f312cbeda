//! Checkpoint command implementations
//!
//! Commands:
//! - `waypoint checkpoint create <agent> --type <t> [--state-file f]`
//! - `waypoint checkpoint restore <path> [--output f]`
//! - `waypoint checkpoint latest <agent> --type <t>`
//! - `waypoint checkpoint list <agent> [--type t]`
//! - `waypoint checkpoint release <agent> <path>`
//! - `waypoint checkpoint prune <agent> [--type t]`

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::checkpoints::{AgentState, CheckpointManager, CheckpointType};
use crate::config::Config;

/// Selected type, or every type when none was given
fn kinds(kind: Option<CheckpointType>) -> Vec<CheckpointType> {
    match kind {
        Some(k) => vec![k],
        None => CheckpointType::ALL.to_vec(),
    }
}

/// Owning agent of a checkpoint, from its `<agent>/<type>/<file>` location
fn agent_from_path(path: &Path) -> Result<String> {
    path.parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| {
            format!(
                "Cannot determine agent from checkpoint path: {}",
                path.display()
            )
        })
}

/// Create a checkpoint from a state file, or an empty state
pub fn create(
    config: &Config,
    agent_id: &str,
    kind: CheckpointType,
    state_file: Option<PathBuf>,
) -> Result<()> {
    let manager = CheckpointManager::new(config, agent_id)?;
    let state = match state_file {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            serde_json::from_str::<AgentState>(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?
        }
        None => AgentState::default(),
    };

    let path = manager.create_from_state(kind, state)?;
    println!(
        "{} {} checkpoint created: {}",
        "✓".green(),
        kind.to_string().cyan(),
        path.display()
    );
    Ok(())
}

/// Validate a checkpoint and print (or write) its state
pub fn restore(config: &Config, path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let agent_id = agent_from_path(&path)?;
    let manager = CheckpointManager::new(config, &agent_id)?;

    let mut restored: Option<AgentState> = None;
    let checkpoint = manager
        .restore_checkpoint(&path, &mut restored)
        .with_context(|| format!("Failed to restore checkpoint: {}", path.display()))?;
    let state = restored.context("Checkpoint restore produced no state")?;
    let json = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;

    match output {
        Some(out) => {
            fs::write(&out, json)
                .with_context(|| format!("Failed to write state to {}", out.display()))?;
            println!(
                "{} Restored {} ({}) to {}",
                "✓".green(),
                checkpoint.id.cyan(),
                checkpoint.kind,
                out.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Print the newest checkpoint of a type
pub fn latest(config: &Config, agent_id: &str, kind: CheckpointType) -> Result<()> {
    let manager = CheckpointManager::new(config, agent_id)?;
    match manager.latest_checkpoint(kind)? {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => {
            eprintln!(
                "{} No {} checkpoint for agent '{}'",
                "✗".red(),
                kind,
                agent_id
            );
            std::process::exit(1);
        }
    }
}

pub fn list(config: &Config, agent_id: &str, kind: Option<CheckpointType>) -> Result<()> {
    let manager = CheckpointManager::new(config, agent_id)?;
    let mut total = 0;
    for kind in kinds(kind) {
        let entries = manager.list_checkpoints(kind)?;
        if entries.is_empty() {
            continue;
        }
        println!("{} ({})", kind.to_string().bold(), entries.len());
        for entry in &entries {
            println!(
                "  {} {}",
                entry
                    .created_at
                    .format("%Y-%m-%dT%H:%M:%SZ")
                    .to_string()
                    .dimmed(),
                entry.path.display()
            );
        }
        total += entries.len();
    }
    if total == 0 {
        println!("No checkpoints for agent '{agent_id}'");
    }
    Ok(())
}

/// Release a pre-operation checkpoint after its operation succeeded
pub fn release(config: &Config, agent_id: &str, path: PathBuf) -> Result<()> {
    let manager = CheckpointManager::new(config, agent_id)?;
    manager.release_pre_operation(&path)?;
    println!("{} Released {}", "✓".green(), path.display());
    Ok(())
}

/// Apply retention now
pub fn prune(config: &Config, agent_id: &str, kind: Option<CheckpointType>) -> Result<()> {
    let manager = CheckpointManager::new(config, agent_id)?;
    let now = Utc::now();
    let mut pruned = 0;
    for kind in kinds(kind) {
        for path in manager.prune(kind, now)? {
            println!("  {} {}", "-".red(), path.display());
            pruned += 1;
        }
    }
    for path in manager.stale_pre_operation(now)? {
        println!(
            "  {} unreleased pre-operation checkpoint: {}",
            "⚠".yellow(),
            path.display()
        );
    }
    println!("{} Pruned {pruned} checkpoint(s)", "✓".green());
    Ok(())
}
