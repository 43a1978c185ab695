use std::sync::Arc;

use taskd_core::config::TaskdConfig;
use taskd_exec::CommandExecutor;
use taskd_scheduler::{
    bootstrap, SchedulerError, TaskScheduler, TaskService, TaskStore, TokioCronEngine,
};
use tracing::info;

/// Everything a running taskd process shares: config, store, the scheduler
/// and the admin service in front of it.
pub struct AppContext {
    pub config: TaskdConfig,
    pub scheduler: Arc<TaskScheduler>,
    pub tasks: TaskService,
}

impl AppContext {
    /// Bootstrap the scheduler and register every active task.
    pub async fn start(config: TaskdConfig, store: Arc<dyn TaskStore>) -> Result<Self, SchedulerError> {
        let scheduler = bootstrap::initialize(&config, Arc::clone(&store)).await?;
        Ok(Self::assemble(config, store, scheduler))
    }

    /// A context for one-shot commands: the scheduler exists so that
    /// run-now and task edits behave exactly as in the daemon, but no
    /// stored task is registered.
    pub fn offline(config: TaskdConfig, store: Arc<dyn TaskStore>) -> Result<Self, SchedulerError> {
        let timezone = config.scheduler.tz()?;
        let executor = Arc::new(CommandExecutor::from_config(&config.executor, &config.backup));
        let engine = Arc::new(TokioCronEngine::new(timezone));
        let scheduler = TaskScheduler::new(Arc::clone(&store), executor, engine, timezone);
        Ok(Self::assemble(config, store, scheduler))
    }

    fn assemble(config: TaskdConfig, store: Arc<dyn TaskStore>, scheduler: Arc<TaskScheduler>) -> Self {
        let tasks = TaskService::new(store, Arc::clone(&scheduler), config.backup.tool.clone());
        Self {
            config,
            scheduler,
            tasks,
        }
    }

    /// Stop every cron job. In-flight executions are left to finish.
    pub fn shutdown(&self) {
        let stats = self.scheduler.stats();
        info!(
            scheduled = stats.scheduled_tasks,
            running = stats.running_tasks,
            "shutting down scheduler"
        );
        self.scheduler.destroy();
    }
}
