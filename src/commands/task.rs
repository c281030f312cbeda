//! Task board command implementations
//!
//! Commands:
//! - `waypoint task list <store>`
//! - `waypoint task add <store> <id> [--priority p] [--depends-on id]...`
//! - `waypoint task update <store> <id> <status> [--actor a] [--note n]`
//! - `waypoint task claim <store> <id> <agent>`
//! - `waypoint task claimable <store>`
//! - `waypoint task archive <store>`
//! - `waypoint task log [--store s] [--task t]`
//! - `waypoint task reconcile <store>`

use anyhow::{bail, Result};
use colored::{ColoredString, Colorize};

use crate::config::Config;
use crate::tasks::{NewTask, Priority, Task, TaskStatus, TaskStore, UpdateOptions};

fn status_label(status: TaskStatus) -> ColoredString {
    let s = status.as_str();
    match status {
        TaskStatus::Completed => s.green(),
        TaskStatus::Failed => s.red(),
        TaskStatus::RescuePending => s.yellow(),
        TaskStatus::InProgress | TaskStatus::Claimed => s.cyan(),
        TaskStatus::Pending | TaskStatus::Ready => s.normal(),
    }
}

fn print_task(task: &Task) {
    let owner = task.owner.as_deref().unwrap_or("-");
    println!(
        "  {:<24} {:<16} {:<9} owner={}{}",
        task.task_id,
        status_label(task.status),
        task.priority.to_string(),
        owner,
        match &task.title {
            Some(title) => format!("  {}", title.dimmed()),
            None => String::new(),
        }
    );
    if !task.dependencies.is_empty() {
        println!(
            "  {:<24} {} {}",
            "",
            "depends on".dimmed(),
            task.dependencies.join(", ")
        );
    }
}

pub fn list(config: &Config, store: &str) -> Result<()> {
    let tasks = TaskStore::new(config).read_tasks(store)?;
    if tasks.is_empty() {
        println!("No tasks in store '{store}'");
        return Ok(());
    }
    println!("{} ({} tasks)", store.bold(), tasks.len());
    for task in &tasks {
        print_task(task);
    }
    Ok(())
}

pub fn add(
    config: &Config,
    store: &str,
    task_id: String,
    title: Option<String>,
    priority: Priority,
    depends_on: Vec<String>,
    actor: &str,
) -> Result<()> {
    let new = NewTask {
        title,
        priority,
        dependencies: depends_on,
        ..NewTask::new(task_id)
    };
    let task = TaskStore::new(config).add_task(store, new, actor)?;
    println!(
        "{} Added task '{}' to '{}'",
        "✓".green(),
        task.task_id.cyan(),
        store
    );
    Ok(())
}

pub fn update(
    config: &Config,
    store: &str,
    task_id: &str,
    status: &str,
    opts: UpdateOptions,
) -> Result<()> {
    let tasks = TaskStore::new(config);
    if !tasks.update_task_status(store, task_id, status, &opts)? {
        bail!("Task '{task_id}' was not updated: not found in '{store}' or store unreadable");
    }
    println!(
        "{} {} -> {}",
        "✓".green(),
        task_id.cyan(),
        status.parse::<TaskStatus>().map(status_label)?
    );
    Ok(())
}

pub fn claim(config: &Config, store: &str, task_id: &str, agent_id: &str) -> Result<()> {
    let tasks = TaskStore::new(config);
    if !tasks.claim_task(store, task_id, agent_id, None)? {
        bail!("Task '{task_id}' could not be claimed: missing or owned by another agent");
    }
    println!(
        "{} {} claimed by {}",
        "✓".green(),
        task_id.cyan(),
        agent_id
    );
    Ok(())
}

pub fn claimable(config: &Config, store: &str) -> Result<()> {
    let tasks = TaskStore::new(config).claimable_tasks(store)?;
    if tasks.is_empty() {
        println!("No claimable tasks in '{store}'");
        return Ok(());
    }
    for task in &tasks {
        print_task(task);
    }
    Ok(())
}

pub fn archive(config: &Config, store: &str, actor: &str) -> Result<()> {
    let summary = TaskStore::new(config).archive_terminal(store, actor)?;
    if summary.is_empty() {
        println!("Nothing to archive in '{store}'");
        return Ok(());
    }
    println!(
        "{} Archived {} completed and {} failed task(s); {} remaining",
        "✓".green(),
        summary.completed.len(),
        summary.failed.len(),
        summary.remaining
    );
    Ok(())
}

pub fn log(config: &Config, store: Option<String>, task_id: Option<String>) -> Result<()> {
    let entries = TaskStore::new(config).transaction_log().read_all()?;
    let matching = entries.iter().filter(|e| {
        store.as_deref().is_none_or(|s| e.store == s)
            && task_id.as_deref().is_none_or(|t| e.task_id == t)
    });

    let mut shown = 0;
    for entry in matching {
        let old = entry
            .old_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "(new)".to_string());
        println!(
            "{} {}/{} {} -> {} by {}{}",
            entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string().dimmed(),
            entry.store,
            entry.task_id.cyan(),
            old,
            status_label(entry.new_status),
            entry.actor,
            entry
                .note
                .as_ref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default()
        );
        shown += 1;
    }
    if shown == 0 {
        println!("No matching log entries");
    }
    Ok(())
}

pub fn reconcile(config: &Config, store: &str) -> Result<()> {
    let report = TaskStore::new(config).reconcile(store)?;
    if report.is_consistent() {
        println!(
            "{} '{}' matches the transaction log ({} tasks)",
            "✓".green(),
            store,
            report.checked
        );
        return Ok(());
    }

    for id in &report.missing_from_log {
        println!("  {} {} has no log entries", "⚠".yellow(), id);
    }
    for m in &report.mismatches {
        println!(
            "  {} {} is {} in the store but last logged as {}",
            "✗".red(),
            m.task_id,
            m.store_status,
            m.logged_status
        );
    }
    for id in &report.unknown_in_log {
        println!("  {} {} is logged but not in the store or archive", "⚠".yellow(), id);
    }
    bail!("Store '{store}' diverges from the transaction log")
}
