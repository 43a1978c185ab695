//! Cron engine seam and its Tokio timer implementation.
//!
//! The orchestrator never sleeps on its own. It hands each task's
//! [`CronSchedule`] and a fire callback to a [`CronEngine`], and keeps the
//! returned [`CronHandle`] to pause, resume or tear the job down.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use chrono_tz::Tz;
use futures_util::future::BoxFuture;
use taskd_core::TaskId;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    cron::CronSchedule,
    error::{Result, SchedulerError},
};

/// Invoked once per cron fire. Each call yields a fresh future that the
/// engine drives to completion independently of the timer.
pub type FireCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Control surface for one registered job.
pub trait CronHandle: Send + Sync {
    /// Arm the job. Fires before this call are discarded.
    fn start(&self);

    /// Disarm the job without releasing its timer.
    fn stop(&self);

    /// Disarm and release the job. It never fires again.
    fn destroy(&self);

    fn is_active(&self) -> bool;
}

/// Factory for cron jobs.
pub trait CronEngine: Send + Sync {
    /// Register a job for `schedule`. The job starts disarmed; call
    /// [`CronHandle::start`] to arm it.
    fn create(
        &self,
        task_id: &TaskId,
        schedule: CronSchedule,
        on_fire: FireCallback,
    ) -> Result<Box<dyn CronHandle>>;
}

/// Spawns one Tokio timer per job and evaluates expressions in a fixed zone.
#[derive(Debug, Clone, Copy)]
pub struct TokioCronEngine {
    timezone: Tz,
}

impl TokioCronEngine {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl CronEngine for TokioCronEngine {
    fn create(
        &self,
        task_id: &TaskId,
        schedule: CronSchedule,
        on_fire: FireCallback,
    ) -> Result<Box<dyn CronHandle>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Engine(format!("no Tokio runtime: {e}")))?;

        let armed = Arc::new(AtomicBool::new(false));
        let timer = runtime.spawn(run_timer(
            task_id.clone(),
            schedule,
            self.timezone,
            Arc::clone(&armed),
            on_fire,
        ));

        Ok(Box::new(TokioCronJob {
            armed,
            destroyed: AtomicBool::new(false),
            timer,
        }))
    }
}

struct TokioCronJob {
    armed: Arc<AtomicBool>,
    destroyed: AtomicBool,
    timer: JoinHandle<()>,
}

impl CronHandle for TokioCronJob {
    fn start(&self) {
        if !self.destroyed.load(Ordering::SeqCst) {
            self.armed.store(true, Ordering::SeqCst);
        }
    }

    fn stop(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.destroyed.store(true, Ordering::SeqCst);
        self.timer.abort();
    }

    fn is_active(&self) -> bool {
        self.armed.load(Ordering::SeqCst) && !self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for TokioCronJob {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

/// Sleep until each occurrence and fire if armed. Executions are spawned so
/// a long run never delays the next tick; overlap is the guard's business.
async fn run_timer(
    task_id: TaskId,
    schedule: CronSchedule,
    tz: Tz,
    armed: Arc<AtomicBool>,
    on_fire: FireCallback,
) {
    let mut after = Utc::now();
    loop {
        let Some(next) = schedule.next_after(tz, after) else {
            warn!(task_id = %task_id, schedule = %schedule.expression(), "no future occurrence, timer stopped");
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if armed.load(Ordering::SeqCst) {
            debug!(task_id = %task_id, fire_at = %next, "cron fired");
            tokio::spawn(on_fire());
        }

        // Never re-fire the same occurrence, and skip slots missed while
        // the process was suspended.
        after = next.max(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn counting_callback() -> (FireCallback, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_fire: FireCallback = Arc::new(move || {
            let tx = tx.clone();
            async move {
                let _ = tx.send(());
            }
            .boxed()
        });
        (on_fire, rx)
    }

    fn every_minute() -> CronSchedule {
        CronSchedule::parse("* * * * *").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn armed_job_fires() {
        let (on_fire, mut rx) = counting_callback();
        let engine = TokioCronEngine::new(chrono_tz::UTC);
        let job = engine
            .create(&TaskId::from("t1"), every_minute(), on_fire)
            .unwrap();
        job.start();
        assert!(job.is_active());

        tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("job should fire within two minutes")
            .expect("channel open");

        job.destroy();
        assert!(!job.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_job_stays_silent() {
        let (on_fire, mut rx) = counting_callback();
        let engine = TokioCronEngine::new(chrono_tz::UTC);
        let job = engine
            .create(&TaskId::from("t2"), every_minute(), on_fire)
            .unwrap();
        assert!(!job.is_active());

        let fired = tokio::time::timeout(Duration::from_secs(150), rx.recv()).await;
        assert!(fired.is_err(), "disarmed job must not fire");
    }

    #[tokio::test]
    async fn destroyed_job_cannot_be_restarted() {
        let (on_fire, _rx) = counting_callback();
        let engine = TokioCronEngine::new(chrono_tz::UTC);
        let job = engine
            .create(&TaskId::from("t3"), every_minute(), on_fire)
            .unwrap();
        job.start();
        job.stop();
        assert!(!job.is_active());
        job.destroy();
        job.start();
        assert!(!job.is_active());
    }

    #[test]
    fn create_outside_runtime_is_an_engine_error() {
        let (on_fire, _rx) = counting_callback();
        let engine = TokioCronEngine::new(chrono_tz::UTC);
        let err = engine
            .create(&TaskId::from("t4"), every_minute(), on_fire)
            .err()
            .expect("no runtime");
        assert!(matches!(err, SchedulerError::Engine(_)));
    }
}
