use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskdError};

pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const DEFAULT_SHELL: &str = "sh";
pub const GENERIC_TIMEOUT_SECS: u64 = 5 * 60;
pub const GENERIC_MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024; // 10 MB per stream
pub const BACKUP_TIMEOUT_SECS: u64 = 30 * 60;
pub const BACKUP_MAX_BUFFER_BYTES: usize = 50 * 1024 * 1024; // 50 MB per stream
pub const DEFAULT_MAX_LOG_OUTPUT_CHARS: usize = 100_000;
pub const DEFAULT_BACKUP_TOOL: &str = "rclone";
pub const DEFAULT_BACKUP_CONFIG_ENV: &str = "RCLONE_CONFIG";

/// Top-level config (taskd.toml + TASKD_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskdConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA zone used to evaluate cron expressions.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

impl SchedulerConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| TaskdError::Config(format!("invalid timezone {:?}: {e}", self.timezone)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Limits applied by the two execution strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_generic_timeout")]
    pub generic_timeout_secs: u64,
    #[serde(default = "default_generic_buffer")]
    pub generic_max_buffer_bytes: usize,
    #[serde(default = "default_backup_timeout")]
    pub backup_timeout_secs: u64,
    #[serde(default = "default_backup_buffer")]
    pub backup_max_buffer_bytes: usize,
    /// Output stored on an execution log row is truncated to this many chars.
    #[serde(default = "default_max_log_output")]
    pub max_log_output_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            generic_timeout_secs: GENERIC_TIMEOUT_SECS,
            generic_max_buffer_bytes: GENERIC_MAX_BUFFER_BYTES,
            backup_timeout_secs: BACKUP_TIMEOUT_SECS,
            backup_max_buffer_bytes: BACKUP_MAX_BUFFER_BYTES,
            max_log_output_chars: DEFAULT_MAX_LOG_OUTPUT_CHARS,
        }
    }
}

/// Backup tool integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Binary name that marks a `backup` task's command as a backup run.
    #[serde(default = "default_backup_tool")]
    pub tool: String,
    /// Environment variable the tool reads its config file path from.
    #[serde(default = "default_backup_config_env")]
    pub config_env: String,
    /// Injected into the backup process as `<config_env>=<config_path>`.
    /// Defaults to the current value of `RCLONE_CONFIG`.
    #[serde(default = "default_backup_config_path")]
    pub config_path: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            tool: default_backup_tool(),
            config_env: default_backup_config_env(),
            config_path: default_backup_config_path(),
        }
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}
fn default_generic_timeout() -> u64 {
    GENERIC_TIMEOUT_SECS
}
fn default_generic_buffer() -> usize {
    GENERIC_MAX_BUFFER_BYTES
}
fn default_backup_timeout() -> u64 {
    BACKUP_TIMEOUT_SECS
}
fn default_backup_buffer() -> usize {
    BACKUP_MAX_BUFFER_BYTES
}
fn default_max_log_output() -> usize {
    DEFAULT_MAX_LOG_OUTPUT_CHARS
}
fn default_backup_tool() -> String {
    DEFAULT_BACKUP_TOOL.to_string()
}
fn default_backup_config_env() -> String {
    DEFAULT_BACKUP_CONFIG_ENV.to_string()
}
fn default_backup_config_path() -> Option<String> {
    std::env::var(DEFAULT_BACKUP_CONFIG_ENV).ok()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskd/taskd.db", home)
}

impl TaskdConfig {
    /// Load config from a TOML file with TASKD_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TASKD_SCHEDULER__TIMEZONE=UTC` or `TASKD_BACKUP__CONFIG_PATH=/etc/rclone.conf`.
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("TASKD_").split("__")),
        )
    }

    /// Extract and validate a config from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: TaskdConfig = figment
            .extract()
            .map_err(|e| TaskdError::Config(e.to_string()))?;
        config.scheduler.tz()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.taskd/taskd.toml", home)
}
