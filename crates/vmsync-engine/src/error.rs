//! Engine error types

use std::path::PathBuf;
use thiserror::Error;
use vmsync_connectors::ConnectorError;

/// Errors that stop a run.
///
/// Per-object mutation failures are not errors at this level; they are
/// collected on the run summary and the batch carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend unreachable or credentials rejected
    #[error("cannot connect to {backend}: {source}")]
    Connection {
        backend: &'static str,
        #[source]
        source: ConnectorError,
    },

    /// Listing call failed
    #[error("failed to enumerate {backend} inventory: {source}")]
    Enumeration {
        backend: &'static str,
        #[source]
        source: ConnectorError,
    },

    /// One per-object detail fetch failed, so the inventory is incomplete
    #[error("failed to enumerate {backend} inventory: detail fetch for {object} failed: {reason}")]
    DetailFetch {
        backend: &'static str,
        object: String,
        reason: String,
    },

    #[error("another run holds the lock at {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Wrap a failed listing call, promoting transport and auth failures to
    /// connection errors.
    pub fn enumeration(backend: &'static str, source: ConnectorError) -> Self {
        if source.is_connection() {
            SyncError::Connection { backend, source }
        } else {
            SyncError::Enumeration { backend, source }
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(e: config::ConfigError) -> Self {
        SyncError::Config(e.to_string())
    }
}

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;
