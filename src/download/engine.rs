//! Download engine: dedup, bounded parallel retrieval and post-download scan.
//!
//! # Concurrency Model
//!
//! - The engine owns one semaphore sized to the download worker pool and
//!   shared by every site it serves
//! - Each artifact runs in a `JoinSet` owned by the call and holds a permit
//!   (RAII) while it fetches; aborting the caller aborts the set
//! - Page fetches use a separate pool owned by the crawl engine
//!
//! # Dedup
//!
//! Filenames already recorded for the site are skipped before any request.
//! Two URLs in one batch that map to the same filename keep only the first.
//! A concurrent batch for the same site can still race past the check; the
//! store then refuses the second entry and the artifact counts as skipped.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::filename::filename_for_url;
use super::retry::{RetryPolicy, retry_with_backoff};
use super::HttpClient;
use crate::crawl::HarvestStats;
use crate::scanner::CredentialScanner;
use crate::store::TrackingStore;

/// Counts from one [`DownloadEngine::download_files`] call.
///
/// `failed` artifacts exhausted their retries; they are neither downloaded
/// nor skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    /// Artifacts fetched and recorded.
    pub downloaded: usize,
    /// Artifacts whose filename was already recorded.
    pub skipped: usize,
    /// Artifacts that could not be fetched or recorded.
    pub failed: usize,
    /// Credential matches found inside downloaded artifacts.
    pub keys_found: usize,
}

enum ArtifactOutcome {
    Downloaded { keys_found: usize },
    Skipped,
    Failed,
}

/// Retrieves artifacts for a site and feeds them back into the store.
#[derive(Debug)]
pub struct DownloadEngine {
    client: HttpClient,
    store: Arc<TrackingStore>,
    scanner: Arc<CredentialScanner>,
    retry_policy: RetryPolicy,
    downloads_dir: PathBuf,
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl DownloadEngine {
    /// Creates an engine with a pool of `workers` concurrent downloads.
    ///
    /// `workers` is clamped to at least 1.
    #[must_use]
    pub fn new(
        client: HttpClient,
        store: Arc<TrackingStore>,
        scanner: Arc<CredentialScanner>,
        retry_policy: RetryPolicy,
        downloads_dir: impl Into<PathBuf>,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            client,
            store,
            scanner,
            retry_policy,
            downloads_dir: downloads_dir.into(),
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Size of the worker pool.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Downloads every artifact URL not yet recorded for `site`.
    ///
    /// Each success writes `<downloads_dir>/<site>/<filename>`, persists a
    /// download entry, then scans the file and merges found credentials.
    /// Individual failures are logged and counted; they never abort the batch.
    /// When `stats` is given, each artifact is counted into it as soon as it
    /// settles.
    ///
    /// The per-artifact tasks belong to this call: dropping the returned
    /// future aborts the downloads still in flight.
    #[instrument(skip(self, urls, stats))]
    pub async fn download_files<I>(
        &self,
        site: &str,
        urls: I,
        stats: Option<&HarvestStats>,
    ) -> DownloadSummary
    where
        I: IntoIterator<Item = String>,
    {
        let mut summary = DownloadSummary::default();
        let mut taken = self.store.get_downloaded_filenames(site);

        let mut urls: Vec<String> = urls.into_iter().collect();
        urls.sort();
        urls.dedup();

        let site_dir = self.downloads_dir.join(site);
        let mut tasks = JoinSet::new();

        for url in urls {
            let filename = filename_for_url(&url);
            if !taken.insert(filename.clone()) {
                debug!(%url, %filename, "already downloaded, skipping");
                summary.skipped += 1;
                if let Some(stats) = stats {
                    stats.add_downloads(0, 1);
                }
                continue;
            }

            let semaphore = Arc::clone(&self.semaphore);
            let client = self.client.clone();
            let store = Arc::clone(&self.store);
            let scanner = Arc::clone(&self.scanner);
            let policy = self.retry_policy.clone();
            let target = site_dir.join(&filename);
            let site = site.to_string();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    warn!(%url, "download pool closed");
                    return ArtifactOutcome::Failed;
                };
                fetch_artifact(&client, &store, &scanner, &policy, &site, &url, target, &filename)
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ArtifactOutcome::Downloaded { keys_found }) => {
                    summary.downloaded += 1;
                    summary.keys_found += keys_found;
                    if let Some(stats) = stats {
                        stats.add_downloads(1, 0);
                        stats.add_keys(keys_found);
                    }
                }
                Ok(ArtifactOutcome::Skipped) => {
                    summary.skipped += 1;
                    if let Some(stats) = stats {
                        stats.add_downloads(0, 1);
                    }
                }
                Ok(ArtifactOutcome::Failed) => summary.failed += 1,
                Err(e) => {
                    warn!(error = %e, "download task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            "site downloads complete"
        );
        summary
    }
}

#[allow(clippy::too_many_arguments)]
async fn fetch_artifact(
    client: &HttpClient,
    store: &TrackingStore,
    scanner: &CredentialScanner,
    policy: &RetryPolicy,
    site: &str,
    url: &str,
    target: PathBuf,
    filename: &str,
) -> ArtifactOutcome {
    let download = retry_with_backoff(policy, url, |_| client.download_to_path(url, &target)).await;
    if let Err(error) = download {
        warn!(%url, %error, "download failed after all attempts");
        return ArtifactOutcome::Failed;
    }

    let local_path = target.display().to_string();
    match store.add_download_entry(site, url, &local_path, filename).await {
        Ok(true) => info!(%filename, site, "downloaded"),
        Ok(false) => return ArtifactOutcome::Skipped,
        Err(error) => {
            warn!(%url, %error, "could not record download");
            return ArtifactOutcome::Failed;
        }
    }

    let credentials = scanner.scan_file(&target).await;
    if !credentials.is_empty() {
        info!(%filename, count = credentials.len(), "credentials found in artifact");
        if let Err(error) = store.add_keys(site, &credentials).await {
            warn!(%filename, %error, "could not record artifact credentials");
        }
    }
    ArtifactOutcome::Downloaded {
        keys_found: credentials.len(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::HarvestConfig;
    use crate::scanner::Credential;

    async fn engine(dir: &TempDir) -> (DownloadEngine, Arc<TrackingStore>) {
        let store = Arc::new(
            TrackingStore::load(dir.path().join("downloads.json"))
                .await
                .unwrap(),
        );
        let client = HttpClient::new(&HarvestConfig::default()).unwrap();
        let engine = DownloadEngine::new(
            client,
            Arc::clone(&store),
            Arc::new(CredentialScanner::default()),
            RetryPolicy::new(2, Duration::ZERO),
            dir.path().join("downloads"),
            3,
        );
        (engine, store)
    }

    #[tokio::test]
    async fn test_download_records_entry_and_scans_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("token=abc123\n"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (engine, store) = engine(&dir).await;
        let summary = engine
            .download_files("s", [format!("{}/notes.txt", server.uri())], None)
            .await;

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.keys_found, 1);
        let saved = dir.path().join("downloads").join("s").join("notes.txt");
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "token=abc123\n");
        assert_eq!(store.credentials("s"), vec![Credential::new("token", "abc123")]);
    }

    #[tokio::test]
    async fn test_each_artifact_is_counted_into_stats_as_it_settles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fast.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("token=abc123\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("plain")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (engine, _store) = engine(&dir).await;
        let stats = HarvestStats::new();
        let batch = engine.download_files(
            "s",
            [
                format!("{}/fast.txt", server.uri()),
                format!("{}/slow.txt", server.uri()),
            ],
            Some(&stats),
        );

        // The slow artifact never settles; the fast one is already counted.
        let cut_short = tokio::time::timeout(Duration::from_secs(2), batch).await;
        assert!(cut_short.is_err());
        let counted = stats.snapshot();
        assert_eq!(counted.files_downloaded, 1);
        assert_eq!(counted.files_skipped, 0);
        assert_eq!(counted.keys_found, 1);
    }

    #[tokio::test]
    async fn test_recorded_filename_is_skipped_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (engine, store) = engine(&dir).await;
        store
            .add_download_entry("s", "https://old.test/report.csv", "p", "report.csv")
            .await
            .unwrap();

        let summary = engine
            .download_files("s", [format!("{}/new/report.csv", server.uri())], None)
            .await;
        assert_eq!(summary, DownloadSummary { skipped: 1, ..DownloadSummary::default() });
        assert_eq!(store.site_stats("s").files, 1);
    }

    #[tokio::test]
    async fn test_same_filename_twice_in_one_batch_downloads_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a,b"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (engine, _store) = engine(&dir).await;
        let summary = engine
            .download_files(
                "s",
                [
                    format!("{}/a/data.csv", server.uri()),
                    format!("{}/b/data.csv", server.uri()),
                ],
                None,
            )
            .await;
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_download_is_neither_downloaded_nor_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (engine, store) = engine(&dir).await;
        let summary = engine
            .download_files("s", [format!("{}/broken.zip", server.uri())], None)
            .await;

        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 1);
        assert!(store.get_downloaded_filenames("s").is_empty());
        assert!(!dir.path().join("downloads").join("s").join("broken.zip").exists());
    }

    #[tokio::test]
    async fn test_transient_failure_then_success_is_downloaded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let (engine, _store) = engine(&dir).await;
        let summary = engine
            .download_files("s", [format!("{}/flaky.json", server.uri())], None)
            .await;
        assert_eq!(summary.downloaded, 1);
    }
}
