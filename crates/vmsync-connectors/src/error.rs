//! Connector error types

use thiserror::Error;

/// Errors raised while talking to a backend.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected the credentials
    #[error("authentication failed against {backend}")]
    AuthenticationFailed { backend: String },

    /// Backend answered with a non-success status
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or error message
        message: String,
    },

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Reply could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Failures that mean the backend could not be reached or refused us.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ConnectorError::Http(_) | ConnectorError::AuthenticationFailed { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectorError::Api { status, .. } => Some(*status),
            ConnectorError::NotFound(_) => Some(404),
            ConnectorError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;
