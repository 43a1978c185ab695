//! Error types for the taskd-exec crate.

use std::fmt;

use thiserror::Error;

/// Everything that can go wrong while running a task command.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The shell process could not be spawned.
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Reading the child's pipes or waiting on it failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The command ran past its strategy's time budget and was killed.
    #[error("Command timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// A single output stream exceeded the capture buffer and the command was killed.
    #[error("Output exceeded {limit} bytes")]
    OutputLimitExceeded { limit: usize },
}

/// A failed run together with whatever output was captured before it failed.
#[derive(Debug)]
pub struct ExecFailure {
    pub error: ExecError,
    pub stdout: String,
    pub stderr: String,
}

impl ExecFailure {
    pub(crate) fn bare(error: ExecError) -> Self {
        Self {
            error,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ExecFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
