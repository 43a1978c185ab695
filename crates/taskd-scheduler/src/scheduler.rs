//! `TaskScheduler`: keeps one cron job per active task and runs each fire
//! through the executor under the execution guard.
//!
//! # Execution sequence
//!
//! ```text
//! fire ─► guard.try_acquire ──busy──► "Task already running" (no writes)
//!              │
//!              ▼
//!         status = running, last_run = now        (store, non-fatal)
//!              │
//!              ▼
//!         executor.execute(strategy, command)     (panics caught)
//!              │
//!              ▼
//!         append execution log                    (store, non-fatal)
//!              │
//!              ▼
//!         status = active | error, next_run       (store, non-fatal,
//!              │                                    skipped if disabled mid-run)
//!              ▼
//!         permit dropped ─► slot free
//! ```
//!
//! A task whose run fails keeps its cron job. The failure is visible as
//! `status = error` on the row and as a per-task consecutive-error count.

use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Instant,
};

use chrono::Utc;
use chrono_tz::Tz;
use futures_util::FutureExt;
use taskd_core::{
    NewExecutionLog, ScheduledTask, TaskExecutionLog, TaskExecutionResult, TaskId, TaskStatus,
    TaskUpdate,
};
use taskd_exec::CommandExecutor;
use tracing::{debug, error, info, warn};

use crate::{
    cron::CronSchedule,
    engine::{CronEngine, CronHandle, FireCallback},
    error::{Result, SchedulerError},
    guard::ExecutionGuard,
    store::TaskStore,
    types::{LiveTaskState, SchedulerStats},
};

/// Orchestrates cron registration and task execution.
///
/// Always handled through an `Arc`; fire callbacks hold a `Weak` back to it,
/// so dropping the last `Arc` silences every job.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    executor: Arc<CommandExecutor>,
    engine: Arc<dyn CronEngine>,
    timezone: Tz,
    jobs: Mutex<HashMap<TaskId, Box<dyn CronHandle>>>,
    guard: ExecutionGuard,
    consecutive_errors: Mutex<HashMap<TaskId, u32>>,
    this: Weak<TaskScheduler>,
}

impl TaskScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<CommandExecutor>,
        engine: Arc<dyn CronEngine>,
        timezone: Tz,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            store,
            executor,
            engine,
            timezone,
            jobs: Mutex::new(HashMap::new()),
            guard: ExecutionGuard::new(),
            consecutive_errors: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    // --- registration -------------------------------------------------------

    /// Load every definition from the store and register the active ones.
    ///
    /// Tasks left in `running` by a previous process are put back to
    /// `active` first. Invalid schedules are skipped with an error log and
    /// never abort the batch. Returns the number of tasks registered; a
    /// store failure is logged and yields `0`.
    pub async fn load_and_schedule_all_tasks(&self) -> usize {
        let tasks = match self.store.scheduled_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("failed to load scheduled tasks: {e}");
                return 0;
            }
        };
        info!(count = tasks.len(), "loaded task definitions");

        let mut scheduled = 0;
        for mut task in tasks {
            if task.status == TaskStatus::Running {
                warn!(task_id = %task.id, name = %task.name, "task was interrupted by a restart, re-activating");
                task.status = TaskStatus::Active;
                self.persist(&task.id, TaskUpdate {
                    status: Some(TaskStatus::Active),
                    ..TaskUpdate::default()
                })
                .await;
            }

            if task.status != TaskStatus::Active {
                debug!(task_id = %task.id, status = %task.status, "not scheduling inactive task");
                continue;
            }
            if self.schedule_task(&task) {
                scheduled += 1;
            }
        }

        info!(scheduled, "task bootstrap complete");
        scheduled
    }

    /// Register (or re-register) `task`'s cron job.
    ///
    /// Returns `true` when a job is now armed for the task. Any job the task
    /// already had is torn down first, so a task never has two jobs. Inactive
    /// tasks and invalid schedules end up with no job and return `false`.
    pub fn schedule_task(&self, task: &ScheduledTask) -> bool {
        match self.try_schedule(task) {
            Ok(armed) => armed,
            Err(e @ SchedulerError::InvalidSchedule { .. }) => {
                error!(task_id = %task.id, name = %task.name, "{e}");
                false
            }
            Err(e) => {
                error!(task_id = %task.id, name = %task.name, "failed to schedule task: {e}");
                false
            }
        }
    }

    fn try_schedule(&self, task: &ScheduledTask) -> Result<bool> {
        if task.status != TaskStatus::Active {
            self.unregister(&task.id);
            return Ok(false);
        }

        let schedule = match CronSchedule::parse(&task.schedule) {
            Ok(schedule) => schedule,
            Err(reason) => {
                debug!(task_id = %task.id, "{reason}");
                self.unregister(&task.id);
                return Err(SchedulerError::InvalidSchedule {
                    id: task.id.to_string(),
                    expression: task.schedule.clone(),
                });
            }
        };

        let handle = self
            .engine
            .create(&task.id, schedule, self.fire_callback(task))?;
        handle.start();

        let replaced = self.jobs().insert(task.id.clone(), handle);
        if let Some(old) = replaced {
            old.destroy();
            debug!(task_id = %task.id, "replaced existing cron job");
        }

        info!(task_id = %task.id, name = %task.name, schedule = %task.schedule, "task scheduled");
        Ok(true)
    }

    /// The closure handed to the engine: run a snapshot of `task` if the
    /// scheduler is still alive.
    fn fire_callback(&self, task: &ScheduledTask) -> FireCallback {
        let scheduler = self.this.clone();
        let snapshot = task.clone();
        Arc::new(move || {
            let scheduler = scheduler.clone();
            let task = snapshot.clone();
            async move {
                if let Some(scheduler) = scheduler.upgrade() {
                    scheduler.execute_task(&task).await;
                }
            }
            .boxed()
        })
    }

    /// Tear down `id`'s cron job. An in-flight execution is not interrupted.
    /// Returns `false` when the task had no job.
    pub fn remove_task(&self, id: &TaskId) -> bool {
        let removed = self.unregister(id);
        self.errors().remove(id);
        if removed {
            info!(task_id = %id, "task unscheduled");
        } else {
            debug!(task_id = %id, "remove requested for unscheduled task");
        }
        removed
    }

    /// Apply a changed definition: drop the old job, then register the new
    /// one if the task is active.
    pub fn update_task(&self, task: &ScheduledTask) -> bool {
        self.remove_task(&task.id);
        if task.status == TaskStatus::Active {
            self.schedule_task(task)
        } else {
            info!(task_id = %task.id, status = %task.status, "task left unscheduled after update");
            false
        }
    }

    fn unregister(&self, id: &TaskId) -> bool {
        let handle = self.jobs().remove(id);
        match handle {
            Some(handle) => {
                handle.destroy();
                true
            }
            None => false,
        }
    }

    // --- execution ------------------------------------------------------------

    /// Run `task` once, now.
    ///
    /// Never fails. A fire that finds the task already executing returns
    /// the `"Task already running"` result without touching the store.
    pub async fn execute_task(&self, task: &ScheduledTask) -> TaskExecutionResult {
        let Some(permit) = self.guard.try_acquire(&task.id) else {
            warn!(task_id = %task.id, name = %task.name, "task already running, skipping this fire");
            return TaskExecutionResult::already_running(Utc::now());
        };

        let started_at = Utc::now();
        let clock = Instant::now();
        info!(task_id = %task.id, name = %task.name, strategy = %task.strategy, "task execution started");

        self.persist(&task.id, TaskUpdate {
            status: Some(TaskStatus::Running),
            last_run: Some(started_at),
            next_run: None,
            unless_status: Some(TaskStatus::Inactive),
        })
        .await;

        let run = AssertUnwindSafe(self.executor.execute(task.strategy, &task.command));
        let result = match run.catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(task_id = %task.id, "executor panicked");
                TaskExecutionResult::failure(
                    started_at,
                    clock.elapsed().as_millis() as u64,
                    "Executor panicked",
                )
            }
        };

        let entry = NewExecutionLog::from_result(task.id.clone(), &result);
        if let Err(e) = self.store.create_task_execution_log(&entry).await {
            warn!(task_id = %task.id, "failed to write execution log: {e}");
        }

        let status = if result.success {
            TaskStatus::Active
        } else {
            TaskStatus::Error
        };
        let next_run = CronSchedule::parse(&task.schedule)
            .ok()
            .and_then(|schedule| schedule.next_after(self.timezone, Utc::now()));
        // An operator may have disabled the task while it ran; that wins.
        let restored = self
            .persist(&task.id, TaskUpdate {
                status: Some(status),
                last_run: Some(started_at),
                next_run,
                unless_status: Some(TaskStatus::Inactive),
            })
            .await;
        if !restored {
            info!(task_id = %task.id, "task row changed during execution, status left as is");
        }

        let failures = self.record_outcome(&task.id, result.success);
        if result.success {
            info!(task_id = %task.id, duration_ms = result.duration_ms, "task execution succeeded");
        } else {
            warn!(
                task_id = %task.id,
                name = %task.name,
                duration_ms = result.duration_ms,
                consecutive_errors = failures,
                error = result.error.as_deref().unwrap_or_default(),
                "task execution failed, task stays scheduled"
            );
        }

        drop(permit);
        result
    }

    /// Best-effort status write; failures are logged and swallowed.
    /// Returns whether a row was updated.
    async fn persist(&self, id: &TaskId, update: TaskUpdate) -> bool {
        match self.store.update_scheduled_task(id, &update).await {
            Ok(touched) => touched,
            Err(e) => {
                warn!(task_id = %id, "failed to persist task status: {e}");
                false
            }
        }
    }

    fn record_outcome(&self, id: &TaskId, success: bool) -> u32 {
        let mut errors = self.errors();
        if success {
            errors.remove(id);
            0
        } else {
            let count = errors.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        }
    }

    // --- introspection --------------------------------------------------------

    pub fn scheduled_tasks_count(&self) -> usize {
        self.jobs().len()
    }

    pub fn running_tasks_count(&self) -> usize {
        self.guard.running_count()
    }

    /// Ids of all tasks with a registered job, sorted.
    pub fn scheduled_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.jobs().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn running_task_ids(&self) -> Vec<TaskId> {
        self.guard.running_ids()
    }

    /// `Running` wins over `Scheduled`: a manual run of an unscheduled task
    /// still reports as running.
    pub fn task_status(&self, id: &TaskId) -> LiveTaskState {
        if self.guard.is_running(id) {
            LiveTaskState::Running
        } else if self.jobs().contains_key(id) {
            LiveTaskState::Scheduled
        } else {
            LiveTaskState::NotScheduled
        }
    }

    /// Failures since the task's last success. Reset by a success or by
    /// removing the task.
    pub fn consecutive_errors(&self, id: &TaskId) -> u32 {
        self.errors().get(id).copied().unwrap_or(0)
    }

    /// `failing_tasks` only counts tasks that still have a job.
    pub fn stats(&self) -> SchedulerStats {
        let jobs = self.jobs();
        let scheduled_tasks = jobs.len();
        let failing_tasks = self.errors().keys().filter(|id| jobs.contains_key(*id)).count();
        drop(jobs);
        SchedulerStats {
            scheduled_tasks,
            running_tasks: self.running_tasks_count(),
            failing_tasks,
        }
    }

    /// Recent logs, newest first, for one task or for all of them.
    pub async fn all_task_logs(
        &self,
        task_id: Option<&TaskId>,
        limit: usize,
    ) -> Result<Vec<TaskExecutionLog>> {
        let logs = match task_id {
            Some(id) => self.store.task_execution_logs(id, limit).await?,
            None => self.store.all_task_execution_logs(limit).await?,
        };
        Ok(logs)
    }

    /// Tear down every job and forget all in-memory state. Executions in
    /// flight run to completion; their permits no longer count.
    pub fn destroy(&self) {
        let jobs: Vec<(TaskId, Box<dyn CronHandle>)> = self.jobs().drain().collect();
        let count = jobs.len();
        for (_, handle) in jobs {
            handle.destroy();
        }
        self.errors().clear();
        self.guard.clear();
        info!(jobs = count, "task scheduler destroyed");
    }

    // --- locks ----------------------------------------------------------------

    fn jobs(&self) -> MutexGuard<'_, HashMap<TaskId, Box<dyn CronHandle>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn errors(&self) -> MutexGuard<'_, HashMap<TaskId, u32>> {
        self.consecutive_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in jobs.drain() {
            handle.destroy();
        }
    }
}
