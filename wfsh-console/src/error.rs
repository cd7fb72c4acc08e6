//! Error types for wfsh-console
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Reconciliation failures carry enough structure for the API
//! layer to map them onto HTTP statuses and machine-readable codes.

use thiserror::Error;
use wfsh_common::model::{ClassificationError, FieldUpdateError};

/// Main error type for the wfsh-console module
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend record fit no known entry shape
    ///
    /// Recovery: log and drop the record; never aborts a batch.
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    /// Field update rejected for the entry variant
    #[error("Invalid field: {0}")]
    InvalidField(#[from] FieldUpdateError),

    /// Local ordering state disagrees with the requested operation
    ///
    /// Recovery: resynchronize the affected show from the backend.
    #[error("Ordering conflict: {0}")]
    OrderingConflict(String),

    /// Backend REST call failed (transient or permanent)
    #[error("Backend request failed: {code} ({message})")]
    BackendRequest {
        /// HTTP status when the backend answered, None for transport failures
        status: Option<u16>,
        /// Machine-readable error code
        code: String,
        /// Human-readable description
        message: String,
    },

    /// Live update channel is down
    #[error("Live update channel disconnected")]
    ChannelDisconnected,

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Backend failure with an HTTP status attached.
    pub fn backend(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BackendRequest {
            status: Some(status),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Backend failure with no HTTP exchange (connect error, body error).
    pub fn backend_transport(message: impl Into<String>) -> Self {
        Error::BackendRequest {
            status: None,
            code: "transport".to_string(),
            message: message.into(),
        }
    }

    /// Backend call exceeded the configured request timeout.
    pub fn backend_timeout() -> Self {
        Error::BackendRequest {
            status: None,
            code: "timeout".to_string(),
            message: "request timed out".to_string(),
        }
    }
}

/// Convenience Result type using wfsh-console Error
pub type Result<T> = std::result::Result<T, Error>;
