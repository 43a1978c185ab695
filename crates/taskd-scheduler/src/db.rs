use rusqlite::Connection;

use crate::error::StoreError;

/// Initialise the task schema in `conn`.
///
/// Creates `scheduled_tasks` and `task_execution_logs` (idempotent). Log rows
/// reference their task and disappear with it, so foreign keys are switched
/// on for this connection.
pub fn init_db(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id           TEXT    NOT NULL PRIMARY KEY,
            name         TEXT    NOT NULL,
            description  TEXT,
            category     TEXT    NOT NULL DEFAULT 'general',
            task_type    TEXT    NOT NULL DEFAULT 'user',
            schedule     TEXT    NOT NULL,   -- five-field cron expression
            command      TEXT    NOT NULL,
            strategy     TEXT    NOT NULL DEFAULT 'generic',
            status       TEXT    NOT NULL DEFAULT 'active',
            last_run     TEXT,               -- RFC 3339 or NULL
            next_run     TEXT,               -- RFC 3339 or NULL, advisory
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_execution_logs (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id      TEXT    NOT NULL
                         REFERENCES scheduled_tasks (id) ON DELETE CASCADE,
            status       TEXT    NOT NULL,   -- 'success' | 'error'
            output       TEXT    NOT NULL DEFAULT '',
            error        TEXT,
            executed_at  TEXT    NOT NULL,
            duration_ms  INTEGER NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_task_logs_task
            ON task_execution_logs (task_id, executed_at DESC);
        CREATE INDEX IF NOT EXISTS idx_task_logs_executed
            ON task_execution_logs (executed_at DESC);
        ",
    )?;
    Ok(())
}
