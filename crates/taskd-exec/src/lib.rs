//! taskd-exec: runs scheduled task commands.
//!
//! Provides the two execution strategies used by the scheduler:
//! - `Generic`: `sh -c` with a 5 minute timeout and a 10 MB capture buffer;
//!   any stderr output fails the run.
//! - `Backup`: `${timestamp}` / `${date}` expansion, a 30 minute timeout, a
//!   50 MB buffer, and the backup tool's config path in the environment;
//!   stderr containing `INFO` is tolerated.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use taskd_core::config::{BackupConfig, ExecutorConfig};
//! use taskd_core::ExecutionStrategy;
//! use taskd_exec::CommandExecutor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let exec = CommandExecutor::from_config(&ExecutorConfig::default(), &BackupConfig::default());
//!     let result = exec.execute(ExecutionStrategy::Generic, "echo hello").await;
//!     println!("{} {}", result.success, result.output);
//! }
//! ```

pub mod error;
pub mod executor;
pub mod shell;
pub mod substitute;
pub mod truncate;
pub mod types;

pub use error::{ExecError, ExecFailure, Result};
pub use executor::CommandExecutor;
pub use types::{ExecOptions, ExecOutput};
