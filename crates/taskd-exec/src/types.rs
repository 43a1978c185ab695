//! Shared data types for taskd-exec.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskd_core::config::{BackupConfig, ExecutorConfig};

/// Raw outcome of a shell run that finished on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Process exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,

    /// Captured standard output (ANSI escapes already stripped).
    pub stdout: String,

    /// Captured standard error (ANSI escapes already stripped).
    pub stderr: String,
}

/// Limits and environment for one shell run.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// The process group is killed if the command runs longer.
    pub timeout: Duration,

    /// Per-stream capture limit; exceeding it kills the command.
    pub max_buffer_bytes: usize,

    /// Extra environment on top of the inherited process environment.
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    /// Limits for the generic shell strategy.
    pub fn generic(config: &ExecutorConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.generic_timeout_secs),
            max_buffer_bytes: config.generic_max_buffer_bytes,
            env: Vec::new(),
        }
    }

    /// Limits for the backup strategy, plus the backup tool's config path.
    pub fn backup(config: &ExecutorConfig, backup: &BackupConfig) -> Self {
        let env = backup
            .config_path
            .as_ref()
            .map(|path| vec![(backup.config_env.clone(), path.clone())])
            .unwrap_or_default();

        Self {
            timeout: Duration::from_secs(config.backup_timeout_secs),
            max_buffer_bytes: config.backup_max_buffer_bytes,
            env,
        }
    }
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self::generic(&ExecutorConfig::default())
    }
}
