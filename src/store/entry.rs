//! Entry model of the tracking file.
//!
//! Each site maps to one ordered list that mixes download records and
//! credential batches. On disk the variants carry no tag; they are told apart
//! by their fields, which keeps files written by earlier tools loadable.
//!
//! ```json
//! {
//!   "example.com": [
//!     {"file_url": "https://example.com/report.csv", "local_path": "downloads/example.com/report.csv",
//!      "filename": "report.csv", "timestamp": "2024-05-01T10:00:00.000000Z",
//!      "decryption_status": "success", "decrypted_path": "downloads/example.com/decrypted/report.csv",
//!      "decryption_key": "Secr3tK"},
//!     {"keys_found": [{"type": "password", "value": "Secr3tK"}]}
//!   ]
//! }
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::Credential;

/// One element of a site's entry list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    /// A retrieved artifact.
    Download(DownloadEntry),
    /// Credentials harvested for the site.
    Credentials(CredentialBatch),
    /// Anything else found in a hand-edited file, kept verbatim.
    Other(serde_json::Value),
}

impl Entry {
    /// Returns the download record, if this is one.
    #[must_use]
    pub fn as_download(&self) -> Option<&DownloadEntry> {
        match self {
            Self::Download(download) => Some(download),
            _ => None,
        }
    }

    /// Filename this entry claims within its site.
    ///
    /// Hand-edited entries that only carry a `filename` string still claim
    /// it, so they take part in filename dedup.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Download(download) => Some(&download.filename),
            Self::Other(value) => value.get("filename").and_then(serde_json::Value::as_str),
            Self::Credentials(_) => None,
        }
    }

    /// Returns the credential batch, if this is one.
    #[must_use]
    pub fn as_credentials(&self) -> Option<&CredentialBatch> {
        match self {
            Self::Credentials(batch) => Some(batch),
            _ => None,
        }
    }
}

/// Outcome of the decryption pass for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecryptionStatus {
    /// A candidate key decrypted the artifact.
    Success,
    /// Every candidate key was tried and none worked.
    Failed,
}

/// Record of one retrieved artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntry {
    /// Where the artifact was fetched from.
    #[serde(rename = "file_url")]
    pub artifact_url: String,
    /// Where it was written locally.
    pub local_path: String,
    /// Sanitized filename; unique within the site.
    pub filename: String,
    /// UTC time of retrieval, RFC 3339.
    #[serde(default)]
    pub timestamp: String,
    /// Unset until the decryption pass reaches this artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decryption_status: Option<DecryptionStatus>,
    /// Decrypted output location, set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypted_path: Option<String>,
    /// The credential text whose derived key worked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decryption_key: Option<String>,
}

impl DownloadEntry {
    /// Creates a fresh record stamped with the current time.
    pub fn new(
        artifact_url: impl Into<String>,
        local_path: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            artifact_url: artifact_url.into(),
            local_path: local_path.into(),
            filename: filename.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            decryption_status: None,
            decrypted_path: None,
            decryption_key: None,
        }
    }

    /// True once the artifact has been decrypted.
    #[must_use]
    pub fn is_decrypted(&self) -> bool {
        self.decryption_status == Some(DecryptionStatus::Success)
    }
}

/// Accumulated credentials for a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBatch {
    /// Distinct `{type, value}` pairs in discovery order.
    pub keys_found: Vec<Credential>,
}

/// What the decryption pass learned about one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionOutcome {
    /// Decrypted with `key`, output written to `decrypted_path`.
    Success {
        /// Output file.
        decrypted_path: String,
        /// Credential text of the winning key.
        key: String,
    },
    /// No candidate key worked.
    Failed,
}
