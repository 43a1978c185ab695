use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a fresh random task ID (UUIDv4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who owns a task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    User,
    System,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::User => "user",
            TaskType::System => "system",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(TaskType::User),
            "system" => Ok(TaskType::System),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Persisted lifecycle status of a task.
///
/// This is a record of what happened last, not a desired state: the
/// scheduler flips it to `Running` while executing and back to `Active` or
/// `Error` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for scheduling.
    Active,
    /// Disabled by an operator.
    Inactive,
    /// An execution is in flight.
    Running,
    /// The most recent execution failed.
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Active => "active",
            TaskStatus::Inactive => "inactive",
            TaskStatus::Running => "running",
            TaskStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "inactive" => Ok(TaskStatus::Inactive),
            "running" => Ok(TaskStatus::Running),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// How a task's command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Plain `sh -c` run; any stderr output counts as failure.
    #[default]
    Generic,
    /// Placeholder substitution, longer timeout, and stderr lines containing
    /// `INFO` are tolerated.
    Backup,
}

impl ExecutionStrategy {
    /// Pick a strategy for a task that was created without one.
    ///
    /// A task is a backup when its category is `backup` and its command
    /// invokes the configured backup tool.
    pub fn infer(category: &str, command: &str, backup_tool: &str) -> Self {
        if category.eq_ignore_ascii_case("backup")
            && !backup_tool.is_empty()
            && command.contains(backup_tool)
        {
            ExecutionStrategy::Backup
        } else {
            ExecutionStrategy::Generic
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStrategy::Generic => "generic",
            ExecutionStrategy::Backup => "backup",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "generic" => Ok(ExecutionStrategy::Generic),
            "backup" => Ok(ExecutionStrategy::Backup),
            other => Err(format!("unknown execution strategy: {other}")),
        }
    }
}

/// A persistent definition of recurring work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    pub description: Option<String>,
    /// Free-form grouping, e.g. `backup`.
    pub category: String,
    pub task_type: TaskType,
    /// Five-field cron expression.
    pub schedule: String,
    /// Shell command, possibly containing `${timestamp}` / `${date}`.
    pub command: String,
    pub strategy: ExecutionStrategy,
    pub status: TaskStatus,
    /// Start of the most recent execution.
    pub last_run: Option<DateTime<Utc>>,
    /// Advisory; recomputed after every execution.
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// A new active, generic, user-owned task in the `general` category.
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        schedule: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            category: "general".to_string(),
            task_type: TaskType::User,
            schedule: schedule.into(),
            command: command.into(),
            strategy: ExecutionStrategy::Generic,
            status: TaskStatus::Active,
            last_run: None,
            next_run: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a single execution attempt. Never persisted directly; it is
/// mapped into a [`NewExecutionLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionResult {
    pub success: bool,
    /// Merged stdout/stderr text.
    pub output: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Error text reported when a fire is skipped by the execution guard.
pub const ALREADY_RUNNING: &str = "Task already running";

impl TaskExecutionResult {
    /// The result handed back when the task was already executing.
    pub fn already_running(started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(ALREADY_RUNNING.to_string()),
            started_at,
            duration_ms: 0,
        }
    }

    /// A failed result with no captured output.
    pub fn failure(started_at: DateTime<Utc>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            started_at,
            duration_ms,
        }
    }

    pub fn is_skip(&self) -> bool {
        !self.success && self.duration_ms == 0 && self.error.as_deref() == Some(ALREADY_RUNNING)
    }
}

/// Outcome recorded on an execution log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Success,
    Error,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogStatus::Success => "success",
            LogStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogStatus::Success),
            "error" => Ok(LogStatus::Error),
            other => Err(format!("unknown log status: {other}")),
        }
    }
}

/// An append-only execution log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecutionLog {
    pub id: i64,
    pub task_id: TaskId,
    pub status: LogStatus,
    pub output: String,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Insert payload for [`TaskExecutionLog`]; the store assigns the row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExecutionLog {
    pub task_id: TaskId,
    pub status: LogStatus,
    pub output: String,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl NewExecutionLog {
    pub fn from_result(task_id: TaskId, result: &TaskExecutionResult) -> Self {
        Self {
            task_id,
            status: if result.success {
                LogStatus::Success
            } else {
                LogStatus::Error
            },
            output: result.output.clone(),
            error: result.error.clone(),
            executed_at: result.started_at,
            duration_ms: result.duration_ms,
        }
    }
}

/// Partial update written by the scheduler around an execution.
/// `None` fields are left untouched; `updated_at` is always bumped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Skip the whole update if the stored row currently has this status.
    pub unless_status: Option<TaskStatus>,
}
