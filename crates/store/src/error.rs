//! Object-store error types

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for object-store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by object-store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local I/O on the source file or the store's backing path failed
    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store refused or failed the transfer
    #[error("upload of '{key}' failed: {message}")]
    Upload { key: String, message: String },
}

impl StoreError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an upload failure for a destination key
    pub fn upload(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upload {
            key: key.into(),
            message: message.into(),
        }
    }
}
