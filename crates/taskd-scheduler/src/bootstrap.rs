use std::sync::Arc;

use taskd_core::config::TaskdConfig;
use taskd_exec::CommandExecutor;
use tracing::info;

use crate::{
    engine::TokioCronEngine, error::Result, scheduler::TaskScheduler, store::TaskStore,
};

/// Build the executor, cron engine and scheduler from `config`, then load and
/// schedule every active task in `store`.
///
/// Must run inside a Tokio runtime; cron timers are spawned onto it.
pub async fn initialize(config: &TaskdConfig, store: Arc<dyn TaskStore>) -> Result<Arc<TaskScheduler>> {
    let timezone = config.scheduler.tz()?;
    let executor = Arc::new(CommandExecutor::from_config(&config.executor, &config.backup));
    let engine = Arc::new(TokioCronEngine::new(timezone));

    let scheduler = TaskScheduler::new(store, executor, engine, timezone);
    let scheduled = scheduler.load_and_schedule_all_tasks().await;
    info!(scheduled, timezone = timezone.name(), "task scheduler initialized");
    Ok(scheduler)
}
