// Central Error Type for the Application

use std::path::PathBuf;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad caller input, raised before any process is started
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Options rejected by the argument builder
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    /// The tool exited without printing a status line for a single-file call
    #[error("No status line from tool (exit code {exit_code:?}): {diagnostics}")]
    MissingStatus {
        exit_code: Option<i32>,
        diagnostics: String,
    },
}

impl AppError {
    /// True when the external binary could not be launched at all
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::Execution(crate::port::ExecutionError::ToolUnavailable { .. })
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
