use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use waypoint::checkpoints::CheckpointType;
use waypoint::tasks::{Priority, DEFAULT_ACTOR};
use waypoint::validation::clap_id_validator;

const HELP_TEMPLATE: &str = "
 ┬ ┬┌─┐┬ ┬┌─┐┌─┐┬┌┐┌┌┬┐
 │││├─┤└┬┘├─┘│ │││││ │
 └┴┘┴ ┴ ┴ ┴  └─┘┴┘└┘ ┴

{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}";

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Crash-safe agent checkpoints and shared task board", long_about = None)]
#[command(version)]
#[command(help_template = HELP_TEMPLATE)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// State directory (default: .waypoint, or WAYPOINT_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, restore and prune per-agent checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Read and update the shared task board
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Evaluate operational metrics for drift
    Drift {
        #[command(subcommand)]
        command: DriftCommands,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Write a checkpoint for an agent
    Create {
        /// Agent ID (alphanumeric, dash, dot, underscore; max 128 characters)
        #[arg(value_parser = clap_id_validator)]
        agent: String,

        /// Checkpoint type (routine, pre_operation, recovery)
        #[arg(short = 't', long = "type", default_value = "routine")]
        kind: CheckpointType,

        /// JSON file holding the agent state (empty state if omitted)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Validate a checkpoint and print its state
    Restore {
        /// Path to the checkpoint file
        path: PathBuf,

        /// Write the restored state here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the path of the newest checkpoint of a type
    Latest {
        #[arg(value_parser = clap_id_validator)]
        agent: String,

        #[arg(short = 't', long = "type", default_value = "routine")]
        kind: CheckpointType,
    },

    /// List an agent's checkpoints, oldest first
    List {
        #[arg(value_parser = clap_id_validator)]
        agent: String,

        /// Only this type (all types if omitted)
        #[arg(short = 't', long = "type")]
        kind: Option<CheckpointType>,
    },

    /// Delete a pre-operation checkpoint once its operation succeeded
    Release {
        #[arg(value_parser = clap_id_validator)]
        agent: String,

        path: PathBuf,
    },

    /// Apply retention rules now
    Prune {
        #[arg(value_parser = clap_id_validator)]
        agent: String,

        #[arg(short = 't', long = "type")]
        kind: Option<CheckpointType>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List all tasks in a store
    List {
        #[arg(value_parser = clap_id_validator)]
        store: String,
    },

    /// Add a pending task
    Add {
        #[arg(value_parser = clap_id_validator)]
        store: String,

        #[arg(value_parser = clap_id_validator)]
        task_id: String,

        /// Human readable label
        #[arg(long)]
        title: Option<String>,

        /// critical, high, medium or low
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Task that must complete first (can be repeated)
        #[arg(short = 'd', long = "depends-on", value_parser = clap_id_validator)]
        depends_on: Vec<String>,

        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Change a task's status
    Update {
        #[arg(value_parser = clap_id_validator)]
        store: String,

        #[arg(value_parser = clap_id_validator)]
        task_id: String,

        /// pending, ready, claimed, in_progress, completed, failed, rescue_pending
        status: String,

        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,

        /// Note recorded in the task history and the log
        #[arg(short, long)]
        note: Option<String>,

        /// Fail instead of skipping when the store is unreadable
        #[arg(long)]
        fail_on_corrupt: bool,
    },

    /// Claim a pending or ready task for an agent
    Claim {
        #[arg(value_parser = clap_id_validator)]
        store: String,

        #[arg(value_parser = clap_id_validator)]
        task_id: String,

        #[arg(value_parser = clap_id_validator)]
        agent: String,
    },

    /// List tasks whose dependencies are done, most urgent first
    Claimable {
        #[arg(value_parser = clap_id_validator)]
        store: String,
    },

    /// Move completed and failed tasks to the archive
    Archive {
        #[arg(value_parser = clap_id_validator)]
        store: String,

        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },

    /// Show the transaction log
    Log {
        #[arg(short, long, value_parser = clap_id_validator)]
        store: Option<String>,

        #[arg(short, long = "task", value_parser = clap_id_validator)]
        task_id: Option<String>,
    },

    /// Compare a store with the transaction log
    Reconcile {
        #[arg(value_parser = clap_id_validator)]
        store: String,
    },
}

#[derive(Subcommand)]
pub enum DriftCommands {
    /// Check a metrics snapshot against the configured thresholds
    Check {
        /// Cycles since the last checkpoint
        #[arg(long, default_value_t = 0)]
        cycles: u64,

        /// Operations in the rolling window
        #[arg(long, default_value_t = 0)]
        attempts: u64,

        /// Failed operations in the rolling window
        #[arg(long, default_value_t = 0)]
        errors: u64,

        #[arg(long, default_value_t = 0)]
        escalations: u32,
    },
}
