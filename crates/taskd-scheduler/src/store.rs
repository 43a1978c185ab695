use async_trait::async_trait;
use taskd_core::{NewExecutionLog, ScheduledTask, TaskExecutionLog, TaskId, TaskUpdate};

use crate::error::StoreError;

/// Persistence collaborator for task definitions and execution history.
///
/// The scheduler treats write failures around an execution as non-fatal:
/// they are logged and the execution still completes.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Every task definition, whatever its status, oldest first.
    async fn scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError>;

    async fn task(&self, id: &TaskId) -> Result<Option<ScheduledTask>, StoreError>;

    async fn insert_task(&self, task: &ScheduledTask) -> Result<(), StoreError>;

    /// Overwrite a whole definition. Returns `false` if `task.id` is unknown.
    async fn save_task(&self, task: &ScheduledTask) -> Result<bool, StoreError>;

    /// Delete a definition and its logs. Returns `false` if `id` is unknown.
    async fn delete_task(&self, id: &TaskId) -> Result<bool, StoreError>;

    /// Apply the `Some` fields of `update` and bump `updated_at`.
    ///
    /// Returns `false` when no row was touched: `id` is unknown, or the row
    /// is in `update.unless_status`.
    async fn update_scheduled_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<bool, StoreError>;

    /// Append a log row and return its id.
    async fn create_task_execution_log(&self, entry: &NewExecutionLog) -> Result<i64, StoreError>;

    /// Most recent logs of one task, newest first.
    async fn task_execution_logs(
        &self,
        task_id: &TaskId,
        limit: usize,
    ) -> Result<Vec<TaskExecutionLog>, StoreError>;

    /// Most recent logs across all tasks, newest first.
    async fn all_task_execution_logs(&self, limit: usize) -> Result<Vec<TaskExecutionLog>, StoreError>;
}
