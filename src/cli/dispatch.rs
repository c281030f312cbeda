use anyhow::Result;
use waypoint::commands::{checkpoint, drift, task};
use waypoint::config::Config;
use waypoint::drift::DriftMetrics;
use waypoint::tasks::UpdateOptions;

use super::types::{CheckpointCommands, Commands, DriftCommands, TaskCommands};

pub fn dispatch(config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Create {
                agent,
                kind,
                state_file,
            } => checkpoint::create(config, &agent, kind, state_file),
            CheckpointCommands::Restore { path, output } => {
                checkpoint::restore(config, path, output)
            }
            CheckpointCommands::Latest { agent, kind } => checkpoint::latest(config, &agent, kind),
            CheckpointCommands::List { agent, kind } => checkpoint::list(config, &agent, kind),
            CheckpointCommands::Release { agent, path } => {
                checkpoint::release(config, &agent, path)
            }
            CheckpointCommands::Prune { agent, kind } => checkpoint::prune(config, &agent, kind),
        },
        Commands::Task { command } => match command {
            TaskCommands::List { store } => task::list(config, &store),
            TaskCommands::Add {
                store,
                task_id,
                title,
                priority,
                depends_on,
                actor,
            } => task::add(config, &store, task_id, title, priority, depends_on, &actor),
            TaskCommands::Update {
                store,
                task_id,
                status,
                actor,
                note,
                fail_on_corrupt,
            } => {
                let mut opts = UpdateOptions::by(actor);
                opts.note = note;
                if fail_on_corrupt {
                    opts.fail_on_corrupt = Some(true);
                }
                task::update(config, &store, &task_id, &status, opts)
            }
            TaskCommands::Claim {
                store,
                task_id,
                agent,
            } => task::claim(config, &store, &task_id, &agent),
            TaskCommands::Claimable { store } => task::claimable(config, &store),
            TaskCommands::Archive { store, actor } => task::archive(config, &store, &actor),
            TaskCommands::Log { store, task_id } => task::log(config, store, task_id),
            TaskCommands::Reconcile { store } => task::reconcile(config, &store),
        },
        Commands::Drift { command } => match command {
            DriftCommands::Check {
                cycles,
                attempts,
                errors,
                escalations,
            } => drift::check(
                config,
                DriftMetrics {
                    cycles_since_checkpoint: cycles,
                    window_attempts: attempts,
                    window_errors: errors,
                    escalation_count: escalations,
                },
            ),
        },
    }
}
