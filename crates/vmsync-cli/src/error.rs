//! CLI error types

use thiserror::Error;
use vmsync_engine::SyncError;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials file missing or malformed
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Run failed
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Credentials(_) => 2,
            CliError::Sync(SyncError::AlreadyRunning(_)) => 3,
            CliError::Sync(SyncError::Connection { .. }) => 4,
            _ => 1,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
