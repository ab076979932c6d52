//! Shared error types used across retrofs crates.

use thiserror::Error;

/// Errors from `nfs://` URL handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The URL does not use the `nfs` scheme.
    #[error("Not an NFS URL: {url}")]
    NotNfs {
        /// The rejected URL.
        url: String,
    },

    /// The URL is malformed.
    #[error("Invalid NFS URL {url}: {message}")]
    Invalid {
        /// The URL that failed to parse.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// The URL names a server but no file inside an export.
    #[error("NFS URL has no file component: {url}")]
    MissingFile {
        /// The URL without a file component.
        url: String,
    },
}
