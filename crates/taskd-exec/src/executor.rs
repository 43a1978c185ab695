//! `CommandExecutor`: turns a task command into a [`TaskExecutionResult`].
//!
//! Two strategies share one shell runner and differ in limits, in placeholder
//! expansion, and in how stderr is judged:
//!
//! | Strategy  | Timeout | Buffer | Placeholders | stderr rule                      |
//! |-----------|---------|--------|--------------|----------------------------------|
//! | `Generic` | 5 min   | 10 MB  | no           | any stderr fails the run         |
//! | `Backup`  | 30 min  | 50 MB  | yes          | stderr containing `INFO` is fine |
//!
//! A non-zero exit code fails the run under both strategies.

use std::time::Instant;

use chrono::{DateTime, Utc};
use taskd_core::{
    config::{BackupConfig, ExecutorConfig},
    ExecutionStrategy, TaskExecutionResult,
};
use tracing::{debug, warn};

use crate::{
    shell,
    substitute::substitute_placeholders,
    truncate::truncate_middle,
    types::{ExecOptions, ExecOutput},
};

/// Marker that makes stderr output from a backup tool non-fatal.
pub const BACKUP_INFO_MARKER: &str = "INFO";

/// Runs task commands. Cheap to share behind an `Arc`; holds no per-run state.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: String,
    generic: ExecOptions,
    backup: ExecOptions,
    max_output_chars: usize,
}

impl CommandExecutor {
    pub fn new(
        shell: impl Into<String>,
        generic: ExecOptions,
        backup: ExecOptions,
        max_output_chars: usize,
    ) -> Self {
        Self {
            shell: shell.into(),
            generic,
            backup,
            max_output_chars,
        }
    }

    pub fn from_config(executor: &ExecutorConfig, backup: &BackupConfig) -> Self {
        Self::new(
            executor.shell.clone(),
            ExecOptions::generic(executor),
            ExecOptions::backup(executor, backup),
            executor.max_log_output_chars,
        )
    }

    /// Run `command` under `strategy`. Never fails: spawn errors, timeouts
    /// and overflows come back as a failed result with whatever output was
    /// captured.
    pub async fn execute(&self, strategy: ExecutionStrategy, command: &str) -> TaskExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        let (command, options) = match strategy {
            ExecutionStrategy::Generic => (command.to_string(), &self.generic),
            ExecutionStrategy::Backup => (substitute_placeholders(command, started_at), &self.backup),
        };
        debug!(%strategy, command = %command, "executing task command");

        let outcome = shell::run(&self.shell, &command, options).await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(output) => evaluate(strategy, output, started_at, duration_ms),
            Err(failure) => {
                warn!(%strategy, error = %failure, duration_ms, "task command aborted");
                TaskExecutionResult {
                    success: false,
                    output: merge_output(&failure.stdout, &failure.stderr),
                    error: Some(failure.error.to_string()),
                    started_at,
                    duration_ms,
                }
            }
        };
        result.output = truncate_middle(&result.output, self.max_output_chars);
        result
    }
}

/// Judge a finished run according to `strategy`'s stderr rule.
pub fn evaluate(
    strategy: ExecutionStrategy,
    output: ExecOutput,
    started_at: DateTime<Utc>,
    duration_ms: u64,
) -> TaskExecutionResult {
    let stderr = output.stderr.trim();
    let stderr_tolerated = match strategy {
        ExecutionStrategy::Generic => stderr.is_empty(),
        ExecutionStrategy::Backup => stderr.is_empty() || stderr.contains(BACKUP_INFO_MARKER),
    };

    let error = if output.exit_code != 0 {
        if stderr.is_empty() {
            Some(format!("Command exited with status {}", output.exit_code))
        } else {
            Some(format!("Command exited with status {}: {stderr}", output.exit_code))
        }
    } else if !stderr_tolerated {
        Some(stderr.to_string())
    } else {
        None
    };

    TaskExecutionResult {
        success: error.is_none(),
        output: merge_output(&output.stdout, &output.stderr),
        error,
        started_at,
        duration_ms,
    }
}

/// stdout followed by stderr, on separate lines.
fn merge_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) if stdout.ends_with('\n') => format!("{stdout}{stderr}"),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> ExecOutput {
        ExecOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn executor() -> CommandExecutor {
        let backup = BackupConfig {
            tool: "backup-tool".to_string(),
            config_env: "TASKD_EXECUTOR_TEST_CONF".to_string(),
            config_path: Some("/etc/backup-tool.conf".to_string()),
        };
        CommandExecutor::from_config(&ExecutorConfig::default(), &backup)
    }

    #[test]
    fn generic_any_stderr_fails() {
        let result = evaluate(
            ExecutionStrategy::Generic,
            output(0, "", "warning: deprecated flag\n"),
            Utc::now(),
            5,
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("warning: deprecated flag"));
        assert!(result.output.contains("warning: deprecated flag"));
    }

    #[test]
    fn generic_info_stderr_still_fails() {
        let result = evaluate(
            ExecutionStrategy::Generic,
            output(0, "", "INFO: 120 files copied"),
            Utc::now(),
            5,
        );
        assert!(!result.success);
    }

    #[test]
    fn backup_info_stderr_is_tolerated() {
        let result = evaluate(
            ExecutionStrategy::Backup,
            output(0, "", "INFO: 120 files copied\n"),
            Utc::now(),
            5,
        );
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.output, "INFO: 120 files copied\n");
    }

    #[test]
    fn backup_other_stderr_fails() {
        let result = evaluate(
            ExecutionStrategy::Backup,
            output(0, "", "ERROR: remote not found"),
            Utc::now(),
            5,
        );
        assert!(!result.success);
    }

    #[test]
    fn non_zero_exit_fails_both_strategies() {
        for strategy in [ExecutionStrategy::Generic, ExecutionStrategy::Backup] {
            let result = evaluate(strategy, output(2, "partial\n", "INFO: aborted"), Utc::now(), 5);
            assert!(!result.success);
            let err = result.error.unwrap();
            assert!(err.starts_with("Command exited with status 2"));
            assert_eq!(result.output, "partial\nINFO: aborted");
        }
    }

    #[test]
    fn whitespace_only_stderr_is_not_output() {
        let result = evaluate(ExecutionStrategy::Generic, output(0, "ok\n", "\n"), Utc::now(), 1);
        assert!(result.success);
    }

    #[tokio::test]
    async fn generic_echo_succeeds() {
        let result = executor()
            .execute(ExecutionStrategy::Generic, "echo hello")
            .await;
        assert!(result.success);
        assert_eq!(result.output, "hello\n");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn generic_stderr_run_fails() {
        let result = executor()
            .execute(ExecutionStrategy::Generic, "echo 'warning: deprecated flag' >&2")
            .await;
        assert!(!result.success);
        assert!(result.output.contains("warning: deprecated flag"));
    }

    #[tokio::test]
    async fn backup_run_expands_placeholders_and_sees_config() {
        let result = executor()
            .execute(
                ExecutionStrategy::Backup,
                "echo backup-${timestamp}.tar; printf '%s' \"$TASKD_EXECUTOR_TEST_CONF\"",
            )
            .await;
        assert!(result.success, "{:?}", result.error);
        let mut lines = result.output.lines();
        let file = lines.next().unwrap();
        assert!(file.starts_with("backup-20"));
        assert!(file.ends_with(".tar"));
        assert!(!file.trim_end_matches(".tar").contains(':'));
        assert!(!file.trim_end_matches(".tar").contains('.'));
        assert_eq!(lines.next(), Some("/etc/backup-tool.conf"));
    }

    #[tokio::test]
    async fn backup_info_on_stderr_succeeds() {
        let result = executor()
            .execute(ExecutionStrategy::Backup, "echo 'INFO: 120 files copied' >&2")
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn timeout_becomes_failed_result() {
        let generic = ExecOptions {
            timeout: Duration::from_millis(200),
            max_buffer_bytes: 1024,
            env: Vec::new(),
        };
        let exec = CommandExecutor::new("sh", generic, ExecOptions::default(), 1_000);
        let result = exec.execute(ExecutionStrategy::Generic, "sleep 30").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(result.duration_ms < 10_000);
    }

    #[tokio::test]
    async fn stored_output_is_truncated() {
        let exec = CommandExecutor::new("sh", ExecOptions::default(), ExecOptions::default(), 100);
        let result = exec
            .execute(ExecutionStrategy::Generic, "printf '%0500d' 0")
            .await;
        assert!(result.success);
        assert!(result.output.contains("chars omitted"));
        assert!(result.output.len() < 200);
    }
}
