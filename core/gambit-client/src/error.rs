//! Error types for gambit-client operations.

use gambit_protocol::{DecodeError, ErrorResponse};
use std::path::PathBuf;

/// All errors that can occur in gambit-client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // ─────────────────────────────────────────────────────────────────────
    // Command Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Authentication failed: {} ({})", .0.detail, .0.code)]
    Auth(ErrorResponse),

    #[error("Request failed with HTTP {status}: {} ({})", .error.detail, .error.code)]
    Request { status: u16, error: ErrorResponse },

    #[error("Network error: {detail}")]
    Network {
        detail: String,
        error: ErrorResponse,
    },

    #[error("Upload failed: {0}")]
    Upload(String),

    // ─────────────────────────────────────────────────────────────────────
    // Realtime Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Failed to decode realtime frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("Realtime transport error: {0}")]
    Transport(String),

    #[error("Realtime service is no longer running")]
    ServiceStopped,

    // ─────────────────────────────────────────────────────────────────────
    // Local Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Token storage failed: {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Transport-level failure with the generic network error body attached.
    pub fn network(detail: impl Into<String>) -> Self {
        ClientError::Network {
            detail: detail.into(),
            error: ErrorResponse::network_error(),
        }
    }

    /// Backend error body, when this error carries one.
    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            ClientError::Auth(error)
            | ClientError::Request { error, .. }
            | ClientError::Network { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for String {
    fn from(err: ClientError) -> String {
        err.to_string()
    }
}
