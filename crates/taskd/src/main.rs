use std::sync::Arc;

use clap::Parser;
use taskd_core::{config::TaskdConfig, TaskStatus};
use taskd_scheduler::{NewTask, SqliteTaskStore, TaskStore};
use tracing::{info, warn};

mod app;
mod cli;
mod commands;

use app::AppContext;
use cli::{Cli, Commands};

const DEFAULT_LOG_FILTER: &str = "taskd=info,taskd_scheduler=info,taskd_exec=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > TASKD_CONFIG env > ~/.taskd/taskd.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("TASKD_CONFIG").ok());
    let config = TaskdConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TaskdConfig::default()
    });

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Validate { expression, count } => {
            commands::validate(config.scheduler.tz()?, &expression, count)
        }
        Commands::Run { id } => commands::run(&offline(config)?, &id).await,
        Commands::Logs { task, limit } => {
            commands::logs(&offline(config)?, task.as_deref(), limit).await
        }
        Commands::Add {
            name,
            schedule,
            command,
            category,
            description,
            strategy,
            inactive,
        } => {
            let status = if inactive {
                TaskStatus::Inactive
            } else {
                TaskStatus::Active
            };
            let new = NewTask {
                name,
                description,
                category,
                task_type: None,
                schedule,
                command,
                strategy,
                status: Some(status),
            };
            commands::add(&offline(config)?, new).await
        }
        Commands::Remove { id } => commands::remove(&offline(config)?, &id).await,
        Commands::Enable { id } => {
            commands::set_status(&offline(config)?, &id, TaskStatus::Active).await
        }
        Commands::Disable { id } => {
            commands::set_status(&offline(config)?, &id, TaskStatus::Inactive).await
        }
        Commands::List => commands::list(&offline(config)?).await,
    }
}

/// Bootstrap the scheduler and block until ctrl-c.
async fn serve(config: TaskdConfig) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let timezone = config.scheduler.timezone.clone();
    let ctx = AppContext::start(config, store).await?;
    info!(
        scheduled = ctx.scheduler.scheduled_tasks_count(),
        %timezone,
        "taskd running, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    ctx.shutdown();
    Ok(())
}

fn offline(config: TaskdConfig) -> anyhow::Result<AppContext> {
    let store = open_store(&config)?;
    Ok(AppContext::offline(config, store)?)
}

/// Single SQLite file for task definitions and execution logs.
fn open_store(config: &TaskdConfig) -> anyhow::Result<Arc<dyn TaskStore>> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path)?;
    info!(path = %db_path, "opening SQLite database");
    Ok(Arc::new(SqliteTaskStore::open(db_path)?))
}

fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    match std::path::Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
