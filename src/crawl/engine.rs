//! Breadth-first traversal of a single site.
//!
//! Each round draws up to `batch_size` URLs from the frontier, fetches them
//! concurrently, then classifies every result before the next round starts:
//!
//! ```text
//! Idle -> Fetching(batch) -> Extracting(batch) -> Idle | Done
//! ```
//!
//! The traversal ends when the frontier is empty or the page budget is spent.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::frontier::Frontier;
use super::stats::HarvestStats;
use crate::download::{HttpClient, RetryPolicy, retry_with_backoff};
use crate::links::LinkClassifier;
use crate::scanner::{Credential, CredentialScanner};
use crate::site::site_id;

/// What one site traversal produced.
#[derive(Debug, Clone, Default)]
pub struct SiteCrawl {
    /// Sanitized site identifier of the seed.
    pub site: String,
    /// Seed URL after normalization.
    pub seed: String,
    /// Pages dispatched, including failures.
    pub pages_visited: usize,
    /// Pages that failed after all retries.
    pub pages_failed: usize,
    /// Artifact URLs discovered, on any site.
    pub artifacts: HashSet<String>,
    /// Every credential match on fetched pages, duplicates included.
    pub credentials: Vec<Credential>,
}

/// Per-site crawler sharing one page-fetch pool across all sites.
#[derive(Debug, Clone)]
pub struct CrawlEngine {
    client: HttpClient,
    classifier: Arc<LinkClassifier>,
    scanner: Arc<CredentialScanner>,
    retry_policy: RetryPolicy,
    page_permits: Arc<Semaphore>,
    max_pages: usize,
    batch_size: usize,
}

impl CrawlEngine {
    /// Creates a crawler.
    ///
    /// `max_concurrent_requests` sizes both the per-round batch and the pool
    /// of page fetches shared by every site this engine crawls.
    #[must_use]
    pub fn new(
        client: HttpClient,
        classifier: Arc<LinkClassifier>,
        scanner: Arc<CredentialScanner>,
        retry_policy: RetryPolicy,
        max_pages: usize,
        max_concurrent_requests: usize,
    ) -> Self {
        let concurrency = max_concurrent_requests.max(1);
        Self {
            client,
            classifier,
            scanner,
            retry_policy,
            page_permits: Arc::new(Semaphore::new(concurrency)),
            max_pages: max_pages.max(1),
            batch_size: concurrency,
        }
    }

    /// Crawls the site of `seed` and returns what was found.
    ///
    /// Same-site links are queued only while the page budget has room;
    /// artifact links are always collected. A page that fails after its
    /// retries is counted and never re-queued. When `stats` is given, pages
    /// are counted into it as soon as they are dispatched.
    #[instrument(skip(self, stats), fields(site))]
    pub async fn crawl_site(&self, seed: &str, stats: Option<&HarvestStats>) -> SiteCrawl {
        let seed = normalize_seed(seed);
        let site = site_id(&seed);
        tracing::Span::current().record("site", site.as_str());
        info!(%seed, "starting crawl");

        let mut frontier = Frontier::new(seed.clone());
        let mut crawl = SiteCrawl {
            site,
            seed,
            ..SiteCrawl::default()
        };

        while !frontier.is_exhausted() && frontier.visited_count() < self.max_pages {
            let budget = self.max_pages - frontier.visited_count();
            let batch = frontier.next_batch(self.batch_size.min(budget));
            if batch.is_empty() {
                break;
            }
            if let Some(stats) = stats {
                stats.add_pages(batch.len());
            }

            let bodies = join_all(batch.iter().map(|url| self.fetch_page(url))).await;

            for (url, body) in batch.iter().zip(bodies) {
                let Some(body) = body else {
                    crawl.pages_failed += 1;
                    continue;
                };

                let links = self.classifier.classify(&body, url);
                crawl.artifacts.extend(links.artifacts);
                if frontier.visited_count() < self.max_pages {
                    for page in links.pages {
                        frontier.push(page);
                    }
                }

                let found = self.scanner.scan_text(&body);
                if !found.is_empty() {
                    debug!(%url, count = found.len(), "credentials on page");
                }
                crawl.credentials.extend(found);
            }
            debug!(
                visited = frontier.visited_count(),
                pending = frontier.pending_count(),
                "round complete"
            );
        }

        crawl.pages_visited = frontier.visited_count();
        info!(
            pages = crawl.pages_visited,
            failed = crawl.pages_failed,
            artifacts = crawl.artifacts.len(),
            credentials = crawl.credentials.len(),
            "crawl complete"
        );
        crawl
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let Ok(_permit) = self.page_permits.acquire().await else {
            warn!("page pool closed");
            return None;
        };
        match retry_with_backoff(&self.retry_policy, url, |_| self.client.fetch_text(url)).await {
            Ok(body) => {
                debug!(%url, bytes = body.len(), "fetched page");
                Some(body)
            }
            Err(error) => {
                warn!(%url, %error, "page failed after all attempts");
                None
            }
        }
    }
}

/// Parses and re-serializes the seed so it matches discovered links, minus fragment.
fn normalize_seed(seed: &str) -> String {
    let seed = seed.trim();
    match Url::parse(seed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => seed.to_string(),
    }
}
