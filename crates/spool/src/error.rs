//! Spool error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for spool operations
pub type Result<T> = std::result::Result<T, SpoolError>;

/// Errors surfaced by the spooling engine
#[derive(Debug, Error)]
pub enum SpoolError {
    /// Local file I/O failed. Disk exhaustion lands here and halts
    /// ingestion; it is never retried.
    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A previous write failed; the spooler refuses new batches until the
    /// process restarts and the recovery scan has run.
    #[error("spooler halted after a write failure")]
    Halted,

    /// The repository is shut down; only the final drain may touch it.
    #[error("repository is shut down")]
    Closed,

    /// Runtime configuration rejected at construction
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key template could not be parsed
    #[error("invalid key template '{template}': {message}")]
    Template { template: String, message: String },
}

impl SpoolError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a construction-time configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a template parse error
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from the local filesystem
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Whether this error reports an exhausted disk or quota
    pub fn is_disk_full(&self) -> bool {
        matches!(
            self,
            Self::Io { source, .. } if matches!(
                source.kind(),
                io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded
            )
        )
    }
}
