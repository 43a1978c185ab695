use std::fmt;

use serde::{Deserialize, Serialize};

/// In-memory view of a task, as opposed to its persisted `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LiveTaskState {
    /// No cron job is registered for the task.
    NotScheduled,
    /// A cron job is registered and no execution is in flight.
    Scheduled,
    /// An execution holds the task's guard slot.
    Running,
}

impl fmt::Display for LiveTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LiveTaskState::NotScheduled => "not-scheduled",
            LiveTaskState::Scheduled => "scheduled",
            LiveTaskState::Running => "running",
        };
        write!(f, "{s}")
    }
}

/// Counters reported by [`TaskScheduler::stats`](crate::scheduler::TaskScheduler::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub scheduled_tasks: usize,
    pub running_tasks: usize,
    /// Scheduled tasks whose latest execution failed.
    pub failing_tasks: usize,
}
