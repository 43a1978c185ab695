//! One-shot CLI subcommands. Output goes to stdout; diagnostics go through
//! `tracing` like the daemon.

use anyhow::{bail, Context};
use chrono::Utc;
use chrono_tz::Tz;
use taskd_core::{ScheduledTask, TaskId, TaskStatus};
use taskd_scheduler::{cron, NewTask, TaskPatch};

use crate::app::AppContext;

pub async fn run(ctx: &AppContext, id: &str) -> anyhow::Result<()> {
    let result = ctx.tasks.run_now(&TaskId::from(id)).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!(
            "task {id} failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub async fn logs(ctx: &AppContext, task: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let task_id = task.map(TaskId::from);
    let logs = ctx.tasks.logs(task_id.as_ref(), limit).await?;
    if logs.is_empty() {
        println!("no execution logs");
        return Ok(());
    }
    for log in logs {
        println!(
            "{}  {:<7}  {:>7}ms  {}",
            log.executed_at.to_rfc3339(),
            log.status.to_string(),
            log.duration_ms,
            log.task_id
        );
        if let Some(error) = log.error.as_deref() {
            println!("    error: {error}");
        }
        for line in log.output.lines().take(5) {
            println!("    | {line}");
        }
    }
    Ok(())
}

pub fn validate(tz: Tz, expression: &str, count: usize) -> anyhow::Result<()> {
    let schedule = cron::CronSchedule::parse(expression)
        .map_err(|reason| anyhow::anyhow!("invalid cron expression: {reason}"))?;

    println!("valid: {}", schedule.expression());
    let mut after = Utc::now();
    for _ in 0..count {
        let Some(next) = schedule.next_after(tz, after) else {
            break;
        };
        println!("  {}", next.with_timezone(&tz).to_rfc3339());
        after = next;
    }
    Ok(())
}

pub async fn add(ctx: &AppContext, new: NewTask) -> anyhow::Result<()> {
    let task = ctx.tasks.create_task(new).await?;
    println!("{}", task.id);
    Ok(())
}

pub async fn remove(ctx: &AppContext, id: &str) -> anyhow::Result<()> {
    ctx.tasks
        .delete_task(&TaskId::from(id))
        .await
        .with_context(|| format!("removing task {id}"))?;
    println!("removed {id}");
    Ok(())
}

pub async fn set_status(ctx: &AppContext, id: &str, status: TaskStatus) -> anyhow::Result<()> {
    let patch = TaskPatch {
        status: Some(status),
        ..TaskPatch::default()
    };
    let task = ctx.tasks.update_task(&TaskId::from(id), patch).await?;
    println!("{} is now {}", task.id, task.status);
    Ok(())
}

pub async fn list(ctx: &AppContext) -> anyhow::Result<()> {
    let tasks = ctx.tasks.list_tasks().await?;
    if tasks.is_empty() {
        println!("no tasks");
        return Ok(());
    }
    for task in &tasks {
        print_task(task);
    }
    Ok(())
}

fn print_task(task: &ScheduledTask) {
    let last = task
        .last_run
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<36}  {:<8}  {:<7}  {:<16}  last={}  {}",
        task.id.to_string(),
        task.status.to_string(),
        task.strategy.to_string(),
        task.schedule,
        last,
        task.name
    );
}
