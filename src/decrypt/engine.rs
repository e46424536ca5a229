//! Decryption pass over the tracking store.
//!
//! For each site the credential values harvested so far become candidate
//! keys. Every recorded CSV artifact that is present on disk and not yet
//! decrypted is tried against those keys; the first key that deciphers the
//! whole file wins. Outcomes are written through to the store one file at a
//! time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::cipher::{FieldCipher, Key, derive_key, key_label};
use super::error::DecryptError;
use super::table::{decrypt_csv, write_output};
use crate::scanner::Credential;
use crate::store::{DecryptionOutcome, DownloadEntry, TrackingStore};

/// Subdirectory next to an artifact that receives its plaintext.
pub const DECRYPTED_SUBDIR: &str = "decrypted";

/// Extension of the only artifact format the cipher understands.
const SUPPORTED_EXTENSION: &str = "csv";

/// Counts from one decryption pass `{success, failed, skipped, no_keys_available}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecryptionStats {
    /// Artifacts deciphered and recorded.
    pub success: usize,
    /// Artifacts no candidate key could decipher.
    pub failed: usize,
    /// Missing, already decrypted or unsupported artifacts.
    pub skipped: usize,
    /// Artifacts of sites with no harvested credentials.
    pub no_keys_available: usize,
}

impl std::ops::AddAssign for DecryptionStats {
    fn add_assign(&mut self, other: Self) {
        self.success += other.success;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.no_keys_available += other.no_keys_available;
    }
}

/// Distinct candidate keys in first-seen order.
#[must_use]
pub fn candidate_keys(credentials: &[Credential]) -> Vec<Key> {
    let mut keys: Vec<Key> = Vec::new();
    for credential in credentials {
        let key = derive_key(&credential.value);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Tries every key against `ciphertext`; returns the first that works.
fn find_key(ciphertext: &[u8], keys: &[Key]) -> Option<(Key, Vec<u8>)> {
    keys.iter().find_map(|key| {
        match decrypt_csv(ciphertext, &FieldCipher::new(*key)) {
            Ok(plaintext) => Some((*key, plaintext)),
            Err(error) => {
                debug!(key = %key_label(key), %error, "key rejected");
                None
            }
        }
    })
}

/// Path the plaintext of `local_path` is written to.
#[must_use]
pub fn decrypted_path_for(local_path: &Path, filename: &str) -> PathBuf {
    local_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DECRYPTED_SUBDIR)
        .join(filename)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SUPPORTED_EXTENSION))
}

enum FileOutcome {
    Decrypted,
    Failed,
    Skipped,
}

/// Decrypts recorded artifacts with the keys harvested for their site.
#[derive(Debug, Clone)]
pub struct DecryptionEngine {
    store: Arc<TrackingStore>,
}

impl DecryptionEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<TrackingStore>) -> Self {
        Self { store }
    }

    /// Runs the pass over every site in the store.
    ///
    /// Never fails: a file that cannot be processed is counted and logged.
    #[instrument(skip(self))]
    pub async fn decrypt_all(&self) -> DecryptionStats {
        info!("starting decryption pass");
        let mut stats = DecryptionStats::default();
        for site in self.store.sites() {
            stats += self.decrypt_site(&site).await;
        }
        info!(
            success = stats.success,
            failed = stats.failed,
            skipped = stats.skipped,
            no_keys_available = stats.no_keys_available,
            "decryption pass complete"
        );
        stats
    }

    /// Runs the pass over one site.
    #[instrument(skip(self))]
    pub async fn decrypt_site(&self, site: &str) -> DecryptionStats {
        let mut stats = DecryptionStats::default();
        let downloads: Vec<DownloadEntry> = self
            .store
            .site_entries(site)
            .iter()
            .filter_map(|entry| entry.as_download().cloned())
            .collect();

        let keys = candidate_keys(&self.store.credentials(site));
        if keys.is_empty() {
            if !downloads.is_empty() {
                warn!(files = downloads.len(), "no keys available");
            }
            stats.no_keys_available += downloads.len();
            return stats;
        }
        info!(keys = keys.len(), files = downloads.len(), "decrypting site");

        let keys: Arc<[Key]> = keys.into();
        for entry in &downloads {
            match self.decrypt_entry(site, entry, &keys).await {
                Ok(FileOutcome::Decrypted) => stats.success += 1,
                Ok(FileOutcome::Failed) => stats.failed += 1,
                Ok(FileOutcome::Skipped) => stats.skipped += 1,
                Err(error) => {
                    warn!(filename = %entry.filename, %error, "could not process artifact");
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    async fn decrypt_entry(
        &self,
        site: &str,
        entry: &DownloadEntry,
        keys: &Arc<[Key]>,
    ) -> Result<FileOutcome, DecryptError> {
        let local_path = Path::new(&entry.local_path);
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            warn!(path = %entry.local_path, "artifact missing, skipping");
            return Ok(FileOutcome::Skipped);
        }
        if entry.is_decrypted() {
            debug!(filename = %entry.filename, "already decrypted, skipping");
            return Ok(FileOutcome::Skipped);
        }
        if !is_supported(local_path) {
            warn!(filename = %entry.filename, "format not supported for decryption, skipping");
            return Ok(FileOutcome::Skipped);
        }

        let ciphertext = tokio::fs::read(local_path)
            .await
            .map_err(|e| DecryptError::io(local_path, e))?;
        let trial_keys = Arc::clone(keys);
        let found = tokio::task::spawn_blocking(move || find_key(&ciphertext, &trial_keys)).await?;

        let Some((key, plaintext)) = found else {
            warn!(filename = %entry.filename, keys = keys.len(), "all keys failed");
            self.store
                .record_decryption(site, &entry.filename, &DecryptionOutcome::Failed)
                .await?;
            return Ok(FileOutcome::Failed);
        };

        let output = decrypted_path_for(local_path, &entry.filename);
        write_output(&output, &plaintext).await?;
        let outcome = DecryptionOutcome::Success {
            decrypted_path: output.display().to_string(),
            key: key_label(&key),
        };
        self.store
            .record_decryption(site, &entry.filename, &outcome)
            .await?;
        info!(filename = %entry.filename, output = %output.display(), "decrypted");
        Ok(FileOutcome::Decrypted)
    }
}
