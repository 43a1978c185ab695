//! `taskd-scheduler`: cron-driven task orchestration with SQLite persistence.
//!
//! # Overview
//!
//! Task definitions live in a [`TaskStore`]. At boot,
//! [`bootstrap::initialize`] loads them and registers one cron job per
//! active task with a valid five-field expression. Each fire runs the task
//! through the [`CommandExecutor`](taskd_exec::CommandExecutor) under the
//! [`ExecutionGuard`], appends an execution log and records the outcome on
//! the task row.
//!
//! | Module      | Role                                                  |
//! |-------------|-------------------------------------------------------|
//! | `cron`      | Five-field validation and next-fire computation      |
//! | `guard`     | At most one in-flight execution per task              |
//! | `engine`    | Cron job seam + Tokio timer implementation            |
//! | `store`     | Persistence trait; `sqlite` implements it             |
//! | `scheduler` | The orchestrator                                      |
//! | `service`   | Admin CRUD, run-now and queries                       |

pub mod bootstrap;
pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod guard;
pub mod scheduler;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use engine::{CronEngine, CronHandle, FireCallback, TokioCronEngine};
pub use error::{Result, SchedulerError, StoreError};
pub use guard::{ExecutionGuard, RunningPermit};
pub use scheduler::TaskScheduler;
pub use service::{NewTask, TaskPatch, TaskService};
pub use sqlite::SqliteTaskStore;
pub use store::TaskStore;
pub use types::{LiveTaskState, SchedulerStats};
