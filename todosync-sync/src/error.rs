//! Error types for todosync-sync.

use std::path::PathBuf;

use thiserror::Error;

use todosync_core::RemoteError;

/// All errors that can arise from a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote folder listing did not succeed. The cycle must be skipped,
    /// never treated as an empty remote.
    #[error("remote folder {folder} is unavailable: {source}")]
    ListUnavailable {
        folder: String,
        #[source]
        source: RemoteError,
    },

    /// A remote call other than listing failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
