//! Multi-site harvest run under a wall-clock ceiling.
//!
//! Every seed site is crawled, its page credentials stored and its artifacts
//! downloaded in its own task. Sites run concurrently and independently.
//! When the ceiling expires, unfinished site tasks are aborted and the
//! counters gathered so far are returned as a partial result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use super::engine::CrawlEngine;
use super::stats::{HarvestStats, HarvestSummary};
use crate::config::HarvestConfig;
use crate::download::{DownloadEngine, DownloadError, HttpClient, RetryPolicy};
use crate::links::LinkClassifier;
use crate::scanner::{CredentialScanner, PatternError};
use crate::store::TrackingStore;

/// Errors constructing a [`Harvester`].
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] DownloadError),

    /// A configured credential pattern does not compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Outcome of one site's crawl and download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteReport {
    /// Sanitized site identifier.
    pub site: String,
    /// Normalized seed URL.
    pub seed: String,
    /// Per-site traversal counters.
    pub summary: HarvestSummary,
    /// Pages that failed after retries.
    pub pages_failed: usize,
    /// Artifacts that failed after retries.
    pub files_failed: usize,
}

/// Result of a whole run. Always produced, even after a timeout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    /// Counters across all sites, including work of aborted sites.
    pub summary: HarvestSummary,
    /// Sites that ran to completion.
    pub sites: Vec<SiteReport>,
    /// True if the wall-clock ceiling cut the run short.
    pub timed_out: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Drives crawl and download for a set of seed sites.
#[derive(Debug, Clone)]
pub struct Harvester {
    crawler: Arc<CrawlEngine>,
    downloader: Arc<DownloadEngine>,
    store: Arc<TrackingStore>,
    crawl_timeout: Duration,
}

impl Harvester {
    /// Wires the crawl and download engines from a config.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the HTTP client or a credential pattern
    /// cannot be built.
    pub fn new(config: &HarvestConfig, store: Arc<TrackingStore>) -> Result<Self, HarvestError> {
        let client = HttpClient::new(config)?;
        let scanner = Arc::new(
            CredentialScanner::new(&config.key_patterns)?
                .with_prefix_scan_bytes(config.prefix_scan_bytes),
        );
        let classifier = Arc::new(LinkClassifier::new(&config.artifact_extensions));
        let retry_policy = RetryPolicy::from_config(config);

        let crawler = CrawlEngine::new(
            client.clone(),
            classifier,
            Arc::clone(&scanner),
            retry_policy.clone(),
            config.max_pages_per_site,
            config.max_concurrent_requests,
        );
        let downloader = DownloadEngine::new(
            client,
            Arc::clone(&store),
            scanner,
            retry_policy,
            &config.downloads_dir,
            config.max_download_workers,
        );

        Ok(Self {
            crawler: Arc::new(crawler),
            downloader: Arc::new(downloader),
            store,
            crawl_timeout: config.crawl_timeout,
        })
    }

    /// Crawls one site, stores its page credentials and downloads its artifacts.
    #[instrument(skip(self, stats))]
    pub async fn harvest_site(&self, seed: &str, stats: &HarvestStats) -> SiteReport {
        let crawl = self.crawler.crawl_site(seed, Some(stats)).await;

        let page_keys = crawl.credentials.len();
        stats.add_keys(page_keys);
        if let Err(error) = self.store.add_keys(&crawl.site, &crawl.credentials).await {
            error!(site = %crawl.site, %error, "could not record page credentials");
        }

        info!(site = %crawl.site, count = crawl.artifacts.len(), "artifacts to download");
        let downloads = self
            .downloader
            .download_files(&crawl.site, crawl.artifacts, Some(stats))
            .await;

        SiteReport {
            site: crawl.site,
            seed: crawl.seed,
            summary: HarvestSummary {
                pages_visited: crawl.pages_visited,
                files_downloaded: downloads.downloaded,
                files_skipped: downloads.skipped,
                keys_found: page_keys + downloads.keys_found,
            },
            pages_failed: crawl.pages_failed,
            files_failed: downloads.failed,
        }
    }

    /// Harvests every seed concurrently under the configured ceiling.
    ///
    /// Never fails: a site that errors or hangs only reduces the totals.
    #[instrument(skip(self, seeds), fields(sites = seeds.len()))]
    pub async fn run(&self, seeds: &[String]) -> HarvestReport {
        let started = Instant::now();
        let stats = Arc::new(HarvestStats::new());
        let mut tasks = JoinSet::new();

        for seed in seeds {
            let harvester = self.clone();
            let stats = Arc::clone(&stats);
            let seed = seed.clone();
            tasks.spawn(async move { harvester.harvest_site(&seed, &stats).await });
        }

        let mut sites = Vec::with_capacity(seeds.len());
        let drained = tokio::time::timeout(self.crawl_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(report) => {
                        info!(site = %report.site, summary = ?report.summary, "site complete");
                        sites.push(report);
                    }
                    Err(e) => warn!(error = %e, "site task panicked"),
                }
            }
        })
        .await;

        let timed_out = drained.is_err();
        if timed_out {
            warn!(
                timeout_secs = self.crawl_timeout.as_secs(),
                unfinished = tasks.len(),
                "crawl timed out, reporting partial results"
            );
            tasks.abort_all();
            // Wait for the aborted sites to be dropped so their downloads stop
            // before the report goes out.
            while tasks.join_next().await.is_some() {}
        }

        sites.sort_by(|a, b| a.site.cmp(&b.site));
        let report = HarvestReport {
            summary: stats.snapshot(),
            sites,
            timed_out,
            elapsed: started.elapsed(),
        };
        info!(summary = ?report.summary, timed_out, "harvest finished");
        report
    }
}
