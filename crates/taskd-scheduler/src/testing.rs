//! Test doubles shared by the scheduler and service tests.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono_tz::Tz;
use taskd_core::{NewExecutionLog, ScheduledTask, TaskExecutionLog, TaskId, TaskUpdate};
use taskd_exec::{CommandExecutor, ExecOptions};

use crate::{
    cron::CronSchedule,
    engine::{CronEngine, CronHandle, FireCallback},
    error::{Result, StoreError},
    scheduler::TaskScheduler,
    sqlite::SqliteTaskStore,
    store::TaskStore,
};

#[derive(Default)]
struct JobState {
    armed: AtomicBool,
    destroyed: AtomicBool,
}

struct ManualJob {
    task_id: TaskId,
    expression: String,
    on_fire: FireCallback,
    state: Arc<JobState>,
}

struct ManualHandle(Arc<JobState>);

impl CronHandle for ManualHandle {
    fn start(&self) {
        if !self.0.destroyed.load(Ordering::SeqCst) {
            self.0.armed.store(true, Ordering::SeqCst);
        }
    }

    fn stop(&self) {
        self.0.armed.store(false, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.0.armed.store(false, Ordering::SeqCst);
        self.0.destroyed.store(true, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.0.armed.load(Ordering::SeqCst) && !self.0.destroyed.load(Ordering::SeqCst)
    }
}

/// Cron engine that never fires on its own; tests call [`ManualEngine::fire`].
#[derive(Default)]
pub(crate) struct ManualEngine {
    jobs: Mutex<Vec<ManualJob>>,
}

impl ManualEngine {
    /// Registrations ever made for `id`, live or not.
    pub(crate) fn created(&self, id: &str) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.task_id.as_str() == id)
            .count()
    }

    /// Registrations for `id` that have not been destroyed.
    pub(crate) fn live(&self, id: &str) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.task_id.as_str() == id && !j.state.destroyed.load(Ordering::SeqCst))
            .count()
    }

    pub(crate) fn live_total(&self) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| !j.state.destroyed.load(Ordering::SeqCst))
            .count()
    }

    pub(crate) fn expression(&self, id: &str) -> Option<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|j| j.task_id.as_str() == id && !j.state.destroyed.load(Ordering::SeqCst))
            .map(|j| j.expression.clone())
    }

    /// Simulate one cron tick for `id`. Returns `false` when no armed job
    /// exists, mirroring a timer that stays silent.
    pub(crate) async fn fire(&self, id: &str) -> bool {
        let callback = {
            let jobs = self.jobs.lock().unwrap();
            jobs.iter()
                .rev()
                .find(|j| j.task_id.as_str() == id && j.state.armed.load(Ordering::SeqCst))
                .map(|j| Arc::clone(&j.on_fire))
        };
        match callback {
            Some(on_fire) => {
                on_fire().await;
                true
            }
            None => false,
        }
    }
}

impl CronEngine for ManualEngine {
    fn create(
        &self,
        task_id: &TaskId,
        schedule: CronSchedule,
        on_fire: FireCallback,
    ) -> Result<Box<dyn CronHandle>> {
        let state = Arc::new(JobState::default());
        self.jobs.lock().unwrap().push(ManualJob {
            task_id: task_id.clone(),
            expression: schedule.expression().to_string(),
            on_fire,
            state: Arc::clone(&state),
        });
        Ok(Box::new(ManualHandle(state)))
    }
}

/// Wraps a real store and fails reads or writes on demand.
pub(crate) struct FlakyStore {
    inner: SqliteTaskStore,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_writes: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteTaskStore::in_memory().unwrap(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn read(&self) -> std::result::Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> std::result::Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn scheduled_tasks(&self) -> std::result::Result<Vec<ScheduledTask>, StoreError> {
        self.read()?;
        self.inner.scheduled_tasks().await
    }

    async fn task(&self, id: &TaskId) -> std::result::Result<Option<ScheduledTask>, StoreError> {
        self.read()?;
        self.inner.task(id).await
    }

    async fn insert_task(&self, task: &ScheduledTask) -> std::result::Result<(), StoreError> {
        self.write()?;
        self.inner.insert_task(task).await
    }

    async fn save_task(&self, task: &ScheduledTask) -> std::result::Result<bool, StoreError> {
        self.write()?;
        self.inner.save_task(task).await
    }

    async fn delete_task(&self, id: &TaskId) -> std::result::Result<bool, StoreError> {
        self.write()?;
        self.inner.delete_task(id).await
    }

    async fn update_scheduled_task(
        &self,
        id: &TaskId,
        update: &TaskUpdate,
    ) -> std::result::Result<bool, StoreError> {
        self.write()?;
        self.inner.update_scheduled_task(id, update).await
    }

    async fn create_task_execution_log(
        &self,
        entry: &NewExecutionLog,
    ) -> std::result::Result<i64, StoreError> {
        self.write()?;
        self.inner.create_task_execution_log(entry).await
    }

    async fn task_execution_logs(
        &self,
        task_id: &TaskId,
        limit: usize,
    ) -> std::result::Result<Vec<TaskExecutionLog>, StoreError> {
        self.read()?;
        self.inner.task_execution_logs(task_id, limit).await
    }

    async fn all_task_execution_logs(
        &self,
        limit: usize,
    ) -> std::result::Result<Vec<TaskExecutionLog>, StoreError> {
        self.read()?;
        self.inner.all_task_execution_logs(limit).await
    }
}

/// Executor with short limits so failure paths finish quickly.
pub(crate) fn test_executor(generic_timeout: Duration) -> Arc<CommandExecutor> {
    let generic = ExecOptions {
        timeout: generic_timeout,
        max_buffer_bytes: 64 * 1024,
        env: Vec::new(),
    };
    let backup = ExecOptions {
        timeout: Duration::from_secs(10),
        max_buffer_bytes: 64 * 1024,
        env: Vec::new(),
    };
    Arc::new(CommandExecutor::new("sh", generic, backup, 10_000))
}

pub(crate) const TZ: Tz = chrono_tz::America::Sao_Paulo;

/// Scheduler over `store` with a manual engine and a 5 s executor timeout.
pub(crate) fn scheduler_over(store: Arc<dyn TaskStore>) -> (Arc<TaskScheduler>, Arc<ManualEngine>) {
    let engine = Arc::new(ManualEngine::default());
    let scheduler = TaskScheduler::new(
        store,
        test_executor(Duration::from_secs(5)),
        engine.clone(),
        TZ,
    );
    (scheduler, engine)
}
