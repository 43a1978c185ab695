//! SQLite-backed [`TaskStore`].

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use taskd_core::{NewExecutionLog, ScheduledTask, TaskExecutionLog, TaskId, TaskUpdate};
use tracing::{debug, instrument, warn};

use crate::{db::init_db, error::StoreError, store::TaskStore};

const TASK_COLUMNS: &str = "id, name, description, category, task_type, schedule, command,
     strategy, status, last_run, next_run, created_at, updated_at";

const LOG_COLUMNS: &str = "id, task_id, status, output, error, executed_at, duration_ms";

/// Task store over a single SQLite connection guarded by a `Mutex`.
///
/// Statements are short and never span an `.await`, so the lock is held
/// only for the duration of one query.
pub struct SqliteTaskStore {
    db: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::new(conn)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY created_at, id"
        ))?;
        let rows: Vec<TaskRow> = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<_>>()?;

        // A single undecodable row must not keep every other task from loading.
        let tasks = rows
            .into_iter()
            .filter_map(|row| match row.into_task() {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("skipping task row: {e}");
                    None
                }
            })
            .collect();
        Ok(tasks)
    }

    async fn task(&self, id: &TaskId) -> Result<Option<ScheduledTask>, StoreError> {
        let db = self.conn()?;
        let row = db
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"),
                [id.as_str()],
                row_to_task,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn insert_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let db = self.conn()?;
        db.execute(
            &format!(
                "INSERT INTO scheduled_tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            rusqlite::params![
                task.id.as_str(),
                task.name,
                task.description,
                task.category,
                task.task_type.to_string(),
                task.schedule,
                task.command,
                task.strategy.to_string(),
                task.status.to_string(),
                task.last_run.as_ref().map(ts),
                task.next_run.as_ref().map(ts),
                ts(&task.created_at),
                ts(&task.updated_at),
            ],
        )?;
        debug!("task inserted");
        Ok(())
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn save_task(&self, task: &ScheduledTask) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE scheduled_tasks
             SET name = ?2, description = ?3, category = ?4, task_type = ?5,
                 schedule = ?6, command = ?7, strategy = ?8, status = ?9,
                 last_run = ?10, next_run = ?11, updated_at = ?12
             WHERE id = ?1",
            rusqlite::params![
                task.id.as_str(),
                task.name,
                task.description,
                task.category,
                task.task_type.to_string(),
                task.schedule,
                task.command,
                task.strategy.to_string(),
                task.status.to_string(),
                task.last_run.as_ref().map(ts),
                task.next_run.as_ref().map(ts),
                ts(&task.updated_at),
            ],
        )?;
        Ok(n > 0)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn delete_task(&self, id: &TaskId) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM scheduled_tasks WHERE id = ?1", [id.as_str()])?;
        Ok(n > 0)
    }

    async fn update_scheduled_task(&self, id: &TaskId, update: &TaskUpdate) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE scheduled_tasks
             SET status     = COALESCE(?2, status),
                 last_run   = COALESCE(?3, last_run),
                 next_run   = COALESCE(?4, next_run),
                 updated_at = ?5
             WHERE id = ?1 AND (?6 IS NULL OR status <> ?6)",
            rusqlite::params![
                id.as_str(),
                update.status.map(|s| s.to_string()),
                update.last_run.as_ref().map(ts),
                update.next_run.as_ref().map(ts),
                ts(&Utc::now()),
                update.unless_status.map(|s| s.to_string()),
            ],
        )?;
        if n == 0 {
            debug!(task_id = %id, "status update matched no task");
        }
        Ok(n > 0)
    }

    async fn create_task_execution_log(&self, entry: &NewExecutionLog) -> Result<i64, StoreError> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO task_execution_logs
             (task_id, status, output, error, executed_at, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                entry.task_id.as_str(),
                entry.status.to_string(),
                entry.output,
                entry.error,
                ts(&entry.executed_at),
                i64::try_from(entry.duration_ms).unwrap_or(i64::MAX),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    async fn task_execution_logs(
        &self,
        task_id: &TaskId,
        limit: usize,
    ) -> Result<Vec<TaskExecutionLog>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM task_execution_logs
             WHERE task_id = ?1
             ORDER BY executed_at DESC, id DESC
             LIMIT ?2"
        ))?;
        let rows: Vec<LogRow> = stmt
            .query_map(rusqlite::params![task_id.as_str(), sql_limit(limit)], row_to_log)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(LogRow::into_log).collect()
    }

    async fn all_task_execution_logs(&self, limit: usize) -> Result<Vec<TaskExecutionLog>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM task_execution_logs
             ORDER BY executed_at DESC, id DESC
             LIMIT ?1"
        ))?;
        let rows: Vec<LogRow> = stmt
            .query_map([sql_limit(limit)], row_to_log)?
            .collect::<rusqlite::Result<_>>()?;
        rows.into_iter().map(LogRow::into_log).collect()
    }
}

// --- row mapping -----------------------------------------------------------

/// Timestamps are stored with fixed precision so that text order is time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(field: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{field} {raw:?}: {e}")))
}

fn parse_opt_ts(field: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|s| parse_ts(field, &s)).transpose()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

struct TaskRow {
    id: String,
    name: String,
    description: Option<String>,
    category: String,
    task_type: String,
    schedule: String,
    command: String,
    strategy: String,
    status: String,
    last_run: Option<String>,
    next_run: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        task_type: row.get(4)?,
        schedule: row.get(5)?,
        command: row.get(6)?,
        strategy: row.get(7)?,
        status: row.get(8)?,
        last_run: row.get(9)?,
        next_run: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl TaskRow {
    fn into_task(self) -> Result<ScheduledTask, StoreError> {
        let corrupt = |e: String| StoreError::Corrupt(format!("task {}: {e}", self.id));
        Ok(ScheduledTask {
            task_type: self.task_type.parse().map_err(corrupt)?,
            strategy: self.strategy.parse().map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            last_run: parse_opt_ts("last_run", self.last_run)?,
            next_run: parse_opt_ts("next_run", self.next_run)?,
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
            id: TaskId(self.id),
            name: self.name,
            description: self.description,
            category: self.category,
            schedule: self.schedule,
            command: self.command,
        })
    }
}

struct LogRow {
    id: i64,
    task_id: String,
    status: String,
    output: String,
    error: Option<String>,
    executed_at: String,
    duration_ms: i64,
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        status: row.get(2)?,
        output: row.get(3)?,
        error: row.get(4)?,
        executed_at: row.get(5)?,
        duration_ms: row.get(6)?,
    })
}

impl LogRow {
    fn into_log(self) -> Result<TaskExecutionLog, StoreError> {
        Ok(TaskExecutionLog {
            status: self
                .status
                .parse()
                .map_err(|e: String| StoreError::Corrupt(format!("log {}: {e}", self.id)))?,
            executed_at: parse_ts("executed_at", &self.executed_at)?,
            duration_ms: u64::try_from(self.duration_ms).unwrap_or_default(),
            id: self.id,
            task_id: TaskId(self.task_id),
            output: self.output,
            error: self.error,
        })
    }
}
