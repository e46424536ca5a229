//! Errors raised by the tracking store.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the tracking file.
///
/// A tracking file that exists but does not parse is not an error: the
/// store logs it and starts empty.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The tracking file could not be read or written.
    #[error("IO error on tracking file {path}: {source}")]
    Io {
        /// The tracking file (or its temporary sibling).
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The in-memory store could not be serialized.
    #[error("failed to serialize tracking data: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates an IO error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
