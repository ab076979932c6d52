//! Error types for transport operations.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Mounting the export failed.
    #[error("Mount failed for {server}:{export}: {message}")]
    MountFailed {
        server: String,
        export: String,
        message: String,
    },

    /// File not found on the export.
    #[error("File not found: {path}")]
    NotFound { path: String },

    /// The server refused access.
    #[error("Access denied to {path}: {message}")]
    AccessDenied { path: String, message: String },

    /// The file handle no longer refers to an open file.
    #[error("Stale file handle")]
    StaleHandle,

    /// Network error.
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// The operation is not supported by this transport.
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: &'static str },
}

impl TransportError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
