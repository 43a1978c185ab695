use clap::{Parser, Subcommand};
use taskd_core::ExecutionStrategy;

#[derive(Debug, Parser)]
#[command(
    name = "taskd",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TASKD_GIT_SHA"), ")"),
    about = "Recurring shell task scheduler"
)]
pub struct Cli {
    /// Path to taskd.toml (falls back to $TASKD_CONFIG, then ~/.taskd/taskd.toml).
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted (default).
    Serve,
    /// Execute one task immediately and print the result.
    Run {
        /// Task id.
        id: String,
    },
    /// Show recent execution logs, newest first.
    Logs {
        /// Only logs of this task.
        #[arg(long)]
        task: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check a cron expression and print its next fire times.
    Validate {
        /// Five-field cron expression, quoted.
        expression: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Create a task.
    Add {
        #[arg(long)]
        name: String,
        /// Five-field cron expression.
        #[arg(long)]
        schedule: String,
        #[arg(long)]
        command: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// `generic` or `backup`; inferred when omitted.
        #[arg(long)]
        strategy: Option<ExecutionStrategy>,
        /// Store the task without scheduling it.
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },
    /// Delete a task and its logs.
    Remove { id: String },
    /// Re-activate a task (also clears an error state).
    Enable { id: String },
    /// Stop scheduling a task without deleting it.
    Disable { id: String },
    /// List every task definition.
    List,
}
