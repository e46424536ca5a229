//! Persistent tracking store for downloads and harvested credentials.
//!
//! The store is the single owner of the tracking file. It keeps the whole
//! structure in memory and writes it through to disk on every mutation, so a
//! later [`TrackingStore::load`] always reflects the last completed call.
//!
//! Mutations of one site are serialized by a per-site lock held across the
//! check, the in-memory update and the save; different sites proceed in
//! parallel and only contend on the final file write.

mod entry;
mod error;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub use entry::{
    CredentialBatch, DecryptionOutcome, DecryptionStatus, DownloadEntry, Entry,
};
pub use error::StoreError;

use crate::scanner::Credential;

/// Counts exposed to callers and the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Sites with at least one entry.
    pub sites: usize,
    /// Download entries.
    pub files: usize,
    /// Credential values across all batches.
    pub credentials: usize,
}

impl StoreStats {
    fn add_entries(&mut self, entries: &[Entry]) {
        for entry in entries {
            match entry {
                Entry::Download(_) => self.files += 1,
                Entry::Credentials(batch) => self.credentials += batch.keys_found.len(),
                Entry::Other(_) => {}
            }
        }
    }
}

/// Write-through store keyed by site identifier.
#[derive(Debug)]
pub struct TrackingStore {
    path: PathBuf,
    sites: DashMap<String, Vec<Entry>>,
    site_locks: DashMap<String, Arc<Mutex<()>>>,
    save_lock: Mutex<()>,
}

impl TrackingStore {
    /// Loads the tracking file at `path`.
    ///
    /// A missing or blank file yields an empty store. A file that does not
    /// parse is logged and also yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let sites = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, Vec<Entry>>>(&raw) {
                Ok(sites) => sites,
                Err(error) => {
                    warn!(%error, "tracking file does not parse, starting empty");
                    BTreeMap::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(StoreError::io(&path, error)),
        };

        info!(path = %path.display(), sites = sites.len(), "loaded tracking data");
        Ok(Self {
            path,
            sites: sites.into_iter().collect(),
            site_locks: DashMap::new(),
            save_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the full store to disk.
    ///
    /// The snapshot is written to a sibling temporary file and renamed over
    /// the tracking file, so readers never see a half-written document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if serialization or any file operation fails.
    pub async fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;

        let snapshot: BTreeMap<String, Vec<Entry>> = self
            .sites
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = temp_path(&self.path);
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        debug!(sites = snapshot.len(), "saved tracking data");
        Ok(())
    }

    /// Filenames already recorded for a site.
    #[must_use]
    pub fn get_downloaded_filenames(&self, site: &str) -> HashSet<String> {
        self.sites
            .get(site)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Entry::filename)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Appends a download entry and persists.
    ///
    /// Returns `false` without writing when the site already has an entry
    /// with this filename.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be saved.
    #[instrument(skip(self, url, local_path))]
    pub async fn add_download_entry(
        &self,
        site: &str,
        url: &str,
        local_path: &str,
        filename: &str,
    ) -> Result<bool, StoreError> {
        let lock = self.site_lock(site);
        let _guard = lock.lock().await;

        {
            let mut entries = self.sites.entry(site.to_string()).or_default();
            let duplicate = entries
                .iter()
                .filter_map(Entry::filename)
                .any(|taken| taken == filename);
            if duplicate {
                debug!("duplicate filename, entry suppressed");
                return Ok(false);
            }
            entries.push(Entry::Download(DownloadEntry::new(url, local_path, filename)));
        }

        self.save().await?;
        info!("recorded download");
        Ok(true)
    }

    /// Merges credentials into the site's batch and persists.
    ///
    /// Pairs already present in any batch of the site, or repeated in the
    /// input, are skipped. New pairs go into the first existing batch, or a
    /// new batch when the site has none. Returns how many pairs were added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be saved.
    #[instrument(skip(self, credentials), fields(count = credentials.len()))]
    pub async fn add_keys(&self, site: &str, credentials: &[Credential]) -> Result<usize, StoreError> {
        if credentials.is_empty() {
            return Ok(0);
        }

        let lock = self.site_lock(site);
        let _guard = lock.lock().await;

        let added = {
            let mut entries = self.sites.entry(site.to_string()).or_default();
            let mut seen: HashSet<Credential> = entries
                .iter()
                .filter_map(Entry::as_credentials)
                .flat_map(|batch| batch.keys_found.iter().cloned())
                .collect();
            let fresh: Vec<Credential> = credentials
                .iter()
                .filter(|credential| seen.insert((*credential).clone()))
                .cloned()
                .collect();
            let added = fresh.len();

            if added > 0 {
                let batch_index = entries
                    .iter()
                    .position(|entry| matches!(entry, Entry::Credentials(_)));
                match batch_index {
                    Some(index) => {
                        if let Entry::Credentials(batch) = &mut entries[index] {
                            batch.keys_found.extend(fresh);
                        }
                    }
                    None => entries.push(Entry::Credentials(CredentialBatch { keys_found: fresh })),
                }
            }
            added
        };

        if added > 0 {
            self.save().await?;
            info!(added, "recorded credentials");
        }
        Ok(added)
    }

    /// Records the decryption outcome for a site's artifact and persists.
    ///
    /// Returns `false` if the site has no download entry with that filename.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be saved.
    #[instrument(skip(self, outcome))]
    pub async fn record_decryption(
        &self,
        site: &str,
        filename: &str,
        outcome: &DecryptionOutcome,
    ) -> Result<bool, StoreError> {
        let lock = self.site_lock(site);
        let _guard = lock.lock().await;

        let updated = {
            let Some(mut entries) = self.sites.get_mut(site) else {
                return Ok(false);
            };
            let download = entries.iter_mut().find_map(|entry| match entry {
                Entry::Download(download) if download.filename == filename => Some(download),
                _ => None,
            });
            match download {
                Some(download) => {
                    match outcome {
                        DecryptionOutcome::Success {
                            decrypted_path,
                            key,
                        } => {
                            download.decryption_status = Some(DecryptionStatus::Success);
                            download.decrypted_path = Some(decrypted_path.clone());
                            download.decryption_key = Some(key.clone());
                        }
                        DecryptionOutcome::Failed => {
                            download.decryption_status = Some(DecryptionStatus::Failed);
                        }
                    }
                    true
                }
                None => false,
            }
        };

        if updated {
            self.save().await?;
        }
        Ok(updated)
    }

    /// Aggregate counts over all sites.
    #[must_use]
    pub fn get_stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            sites: self.sites.len(),
            ..StoreStats::default()
        };
        for item in &self.sites {
            stats.add_entries(item.value());
        }
        stats
    }

    /// Counts for a single site; `sites` is 1 if the site has entries.
    #[must_use]
    pub fn site_stats(&self, site: &str) -> StoreStats {
        let mut stats = StoreStats::default();
        if let Some(entries) = self.sites.get(site) {
            stats.sites = 1;
            stats.add_entries(&entries);
        }
        stats
    }

    /// Site identifiers in sorted order.
    #[must_use]
    pub fn sites(&self) -> Vec<String> {
        let mut sites: Vec<String> = self.sites.iter().map(|item| item.key().clone()).collect();
        sites.sort();
        sites
    }

    /// A copy of the site's entries in insertion order.
    #[must_use]
    pub fn site_entries(&self, site: &str) -> Vec<Entry> {
        self.sites
            .get(site)
            .map(|entries| entries.value().clone())
            .unwrap_or_default()
    }

    /// Every credential recorded for a site, across all batches, in order.
    #[must_use]
    pub fn credentials(&self, site: &str) -> Vec<Credential> {
        self.sites
            .get(site)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Entry::as_credentials)
                    .flat_map(|batch| batch.keys_found.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn site_lock(&self, site: &str) -> Arc<Mutex<()>> {
        self.site_locks
            .entry(site.to_string())
            .or_default()
            .value()
            .clone()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
