use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskdError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskdError {
    /// Short error code string, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            TaskdError::Config(_) => "CONFIG_ERROR",
            TaskdError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskdError>;
