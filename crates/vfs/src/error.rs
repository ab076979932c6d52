//! Error types for the VFS crate.

use thiserror::Error;

use retrofs_common::UrlError;
use retrofs_transport::TransportError;

/// Errors that can occur during VFS operations.
///
/// Recoverable read-path conditions (cache misses, partial hits, wait
/// timeouts) are handled inside the read loop and never appear here.
#[derive(Debug, Error)]
pub enum VfsError {
    /// The transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// URL parsing failed.
    #[error(transparent)]
    Url(#[from] UrlError),

    /// The operation has no NFS-side implementation and is rejected.
    #[error("{operation} is not supported")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
    },
}

impl VfsError {
    /// Create an unsupported-operation error.
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }
}
