use taskd_core::TaskdError;
use thiserror::Error;

/// Errors raised by a [`TaskStore`](crate::store::TaskStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted row could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The store cannot serve requests right now (lock poisoned, backend down).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task's cron expression is malformed or not five fields.
    #[error("Invalid schedule for task {id}: {expression:?}")]
    InvalidSchedule { id: String, expression: String },

    /// A task definition failed validation (empty name, empty command, ...).
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// No task with the given ID exists in the store.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// The cron engine refused to register a job.
    #[error("Cron engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] TaskdError),
}

impl SchedulerError {
    /// Short error code string, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidSchedule { .. } => "INVALID_SCHEDULE",
            SchedulerError::InvalidTask(_) => "INVALID_TASK",
            SchedulerError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            SchedulerError::Engine(_) => "ENGINE_ERROR",
            SchedulerError::Store(_) => "STORE_ERROR",
            SchedulerError::Config(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
