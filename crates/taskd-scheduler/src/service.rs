//! Admin control surface: task CRUD with matching reschedules, run-now and
//! read-only queries.
//!
//! Unlike the orchestrator, every operation here returns a `Result` so a
//! caller (CLI, HTTP handler) can report what went wrong.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskd_core::{
    ExecutionStrategy, ScheduledTask, TaskExecutionLog, TaskExecutionResult, TaskId, TaskStatus,
    TaskType,
};
use tracing::info;

use crate::{
    cron,
    error::{Result, SchedulerError},
    scheduler::TaskScheduler,
    store::TaskStore,
    types::{LiveTaskState, SchedulerStats},
};

/// Category assigned when a new task does not name one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Input for [`TaskService::create_task`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    /// Defaults to [`DEFAULT_CATEGORY`].
    pub category: Option<String>,
    /// Defaults to `user`.
    pub task_type: Option<TaskType>,
    pub schedule: String,
    pub command: String,
    /// Inferred from category and command when absent.
    pub strategy: Option<ExecutionStrategy>,
    /// `active` (default) or `inactive`.
    pub status: Option<TaskStatus>,
}

/// Partial update for [`TaskService::update_task`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub schedule: Option<String>,
    pub command: Option<String>,
    pub strategy: Option<ExecutionStrategy>,
    pub status: Option<TaskStatus>,
}

pub struct TaskService {
    store: Arc<dyn TaskStore>,
    scheduler: Arc<TaskScheduler>,
    backup_tool: String,
}

impl TaskService {
    /// `backup_tool` drives strategy inference for tasks created without one.
    pub fn new(
        store: Arc<dyn TaskStore>,
        scheduler: Arc<TaskScheduler>,
        backup_tool: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scheduler,
            backup_tool: backup_tool.into(),
        }
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// Validate, persist and schedule a new task.
    pub async fn create_task(&self, new: NewTask) -> Result<ScheduledTask> {
        let id = TaskId::new();
        require_text("name", &new.name)?;
        require_text("command", &new.command)?;
        require_schedule(&id, &new.schedule)?;
        let status = new.status.unwrap_or(TaskStatus::Active);
        require_settable(status)?;

        let category = new
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let strategy = new
            .strategy
            .unwrap_or_else(|| ExecutionStrategy::infer(&category, &new.command, &self.backup_tool));

        let mut task = ScheduledTask::new(id, new.name.trim(), new.schedule.trim(), new.command);
        task.description = new.description;
        task.category = category;
        task.task_type = new.task_type.unwrap_or(TaskType::User);
        task.strategy = strategy;
        task.status = status;
        task.next_run = self.advisory_next_run(&task);

        self.store.insert_task(&task).await?;
        self.scheduler.update_task(&task);
        info!(task_id = %task.id, name = %task.name, %strategy, "task created");
        Ok(task)
    }

    /// Apply `patch` to a stored task, persist it and reschedule.
    ///
    /// A task in `error` or `running` comes back as `active` unless the patch
    /// sets a status. An execution in flight is not interrupted.
    pub async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<ScheduledTask> {
        let mut task = self.get_task(id).await?;

        if let Some(name) = patch.name {
            require_text("name", &name)?;
            task.name = name.trim().to_string();
        }
        if let Some(command) = patch.command {
            require_text("command", &command)?;
            task.command = command;
        }
        if let Some(schedule) = patch.schedule {
            require_schedule(id, &schedule)?;
            task.schedule = schedule.trim().to_string();
        }
        match patch.status {
            Some(status) => {
                require_settable(status)?;
                task.status = status;
            }
            // An edit is an operator intervention: an errored task resumes,
            // and a task caught mid-run keeps its schedule.
            None if matches!(task.status, TaskStatus::Error | TaskStatus::Running) => {
                task.status = TaskStatus::Active
            }
            None => {}
        }
        if let Some(description) = patch.description {
            task.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(strategy) = patch.strategy {
            task.strategy = strategy;
        }
        task.next_run = self.advisory_next_run(&task);
        task.updated_at = Utc::now();

        if !self.store.save_task(&task).await? {
            return Err(not_found(id));
        }
        self.scheduler.update_task(&task);
        info!(task_id = %task.id, status = %task.status, "task updated");
        Ok(task)
    }

    /// Unschedule and delete a task together with its logs.
    pub async fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.scheduler.remove_task(id);
        if !self.store.delete_task(id).await? {
            return Err(not_found(id));
        }
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Execute a task immediately, outside its schedule.
    ///
    /// Inactive tasks are refused: a run would write `active` back to the
    /// row and silently re-enable the task on the next boot.
    pub async fn run_now(&self, id: &TaskId) -> Result<TaskExecutionResult> {
        let task = self.get_task(id).await?;
        if task.status == TaskStatus::Inactive {
            return Err(SchedulerError::InvalidTask(format!(
                "task {id} is inactive; activate it before running"
            )));
        }
        info!(task_id = %id, "manual run requested");
        Ok(self.scheduler.execute_task(&task).await)
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<ScheduledTask> {
        self.store.task(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.store.scheduled_tasks().await?)
    }

    pub async fn logs(&self, task_id: Option<&TaskId>, limit: usize) -> Result<Vec<TaskExecutionLog>> {
        self.scheduler.all_task_logs(task_id, limit).await
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    pub fn status(&self, id: &TaskId) -> LiveTaskState {
        self.scheduler.task_status(id)
    }

    fn advisory_next_run(&self, task: &ScheduledTask) -> Option<chrono::DateTime<Utc>> {
        if task.status != TaskStatus::Active {
            return None;
        }
        cron::next_occurrence(&task.schedule, self.scheduler.timezone(), Utc::now())
    }
}

fn not_found(id: &TaskId) -> SchedulerError {
    SchedulerError::TaskNotFound { id: id.to_string() }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SchedulerError::InvalidTask(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_schedule(id: &TaskId, schedule: &str) -> Result<()> {
    if !cron::validate(schedule) {
        return Err(SchedulerError::InvalidSchedule {
            id: id.to_string(),
            expression: schedule.to_string(),
        });
    }
    Ok(())
}

/// `running` and `error` are written by the scheduler, never by an operator.
fn require_settable(status: TaskStatus) -> Result<()> {
    match status {
        TaskStatus::Active | TaskStatus::Inactive => Ok(()),
        other => Err(SchedulerError::InvalidTask(format!(
            "status {other} cannot be set directly"
        ))),
    }
}
