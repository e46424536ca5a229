//! Run statistics shared between concurrent site traversals.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Live counters, updated as work completes so a timed-out run can still
/// report what it achieved.
#[derive(Debug, Default)]
pub struct HarvestStats {
    pages_visited: AtomicUsize,
    files_downloaded: AtomicUsize,
    files_skipped: AtomicUsize,
    keys_found: AtomicUsize,
}

impl HarvestStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_pages(&self, count: usize) {
        self.pages_visited.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn add_downloads(&self, downloaded: usize, skipped: usize) {
        self.files_downloaded.fetch_add(downloaded, Ordering::SeqCst);
        self.files_skipped.fetch_add(skipped, Ordering::SeqCst);
    }

    pub(crate) fn add_keys(&self, count: usize) {
        self.keys_found.fetch_add(count, Ordering::SeqCst);
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> HarvestSummary {
        HarvestSummary {
            pages_visited: self.pages_visited.load(Ordering::SeqCst),
            files_downloaded: self.files_downloaded.load(Ordering::SeqCst),
            files_skipped: self.files_skipped.load(Ordering::SeqCst),
            keys_found: self.keys_found.load(Ordering::SeqCst),
        }
    }
}

/// Traversal result `{pages_visited, files_downloaded, files_skipped, keys_found}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestSummary {
    /// Pages dispatched for fetching, successful or not.
    pub pages_visited: usize,
    /// Artifacts downloaded and recorded.
    pub files_downloaded: usize,
    /// Artifacts skipped as already recorded.
    pub files_skipped: usize,
    /// Credential matches on pages and in artifacts, before dedup.
    pub keys_found: usize,
}
