//! Seed URL documents.
//!
//! A seed file is JSON, either a bare array of URLs or an object with a
//! `urls` array:
//!
//! ```json
//! {"urls": ["https://example.com/", "http://site.onion/"]}
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

/// Errors loading a seed document.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// The file could not be read.
    #[error("cannot read seed file {path}: {source}")]
    Io {
        /// The seed file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is neither a URL array nor an object with `urls`.
    #[error("seed file must be a JSON array of URLs or an object with a \"urls\" array: {0}")]
    Format(#[source] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedDocument {
    List(Vec<String>),
    Object { urls: Vec<String> },
}

/// Parses a seed document, dropping blank entries.
///
/// # Errors
///
/// Returns [`SeedError::Format`] if the document has neither accepted shape.
pub fn parse_seed_urls(json: &str) -> Result<Vec<String>, SeedError> {
    let document: SeedDocument = serde_json::from_str(json).map_err(SeedError::Format)?;
    let urls = match document {
        SeedDocument::List(urls) | SeedDocument::Object { urls } => urls,
    };
    Ok(urls
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect())
}

/// Reads and parses a seed file.
///
/// # Errors
///
/// Returns [`SeedError`] if the file cannot be read or parsed.
#[instrument]
pub async fn load_seed_urls(path: &Path) -> Result<Vec<String>, SeedError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let urls = parse_seed_urls(&text)?;
    debug!(count = urls.len(), "loaded seed urls");
    Ok(urls)
}
