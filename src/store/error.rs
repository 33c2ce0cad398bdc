//! Storage error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting namespace maps or files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A namespace map could not be serialized.
    #[error("cannot encode namespace `{namespace}`: {source}")]
    Encode {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },

    /// A persisted namespace file is unreadable.
    #[error("namespace `{namespace}` is corrupt: {source}")]
    Decode {
        namespace: String,
        #[source]
        source: serde_json::Error,
    },

    /// Namespace name outside the allowed character set.
    #[error("invalid namespace name `{0}`")]
    InvalidNamespace(String),

    /// Logical path that no mount point covers.
    #[error("path `{0}` is not on a mounted volume")]
    Unmounted(String),

    /// A restore has replaced the persisted state; only a restart may follow.
    #[error("restart pending, configuration is read-only")]
    RestartPending,

    /// The backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
