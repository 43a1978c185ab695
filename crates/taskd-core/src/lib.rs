//! `taskd-core`: shared domain types and configuration for the taskd
//! scheduler.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Result, TaskdError};
pub use types::{
    ExecutionStrategy, LogStatus, NewExecutionLog, ScheduledTask, TaskExecutionLog,
    TaskExecutionResult, TaskId, TaskStatus, TaskType, TaskUpdate,
};
