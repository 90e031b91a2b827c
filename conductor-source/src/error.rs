//! Error types for conductor-source.

use std::path::PathBuf;

use thiserror::Error;

/// Failures listing or marking work items.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Local filesystem failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An object-store request failed. `message` carries the SDK's full
    /// error context.
    #[error("object store {operation} failed for bucket '{bucket}': {message}")]
    ObjectStore {
        bucket: String,
        operation: &'static str,
        message: String,
    },

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience constructor for [`SourceError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
