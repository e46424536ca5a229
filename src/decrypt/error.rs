//! Error types for the decryption pass.

use std::path::PathBuf;

use super::cipher::CipherError;
use crate::store::StoreError;

/// Errors raised while transforming artifact files.
///
/// A wrong key is not one of these: it is an expected outcome, reported as
/// [`CipherError`] only by the primitives and folded into statistics by the
/// engine.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    /// A local file could not be read or written.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be transformed under the given key.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// An outcome could not be recorded.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A blocking key trial task did not complete.
    #[error("key trial task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DecryptError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
