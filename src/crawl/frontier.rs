//! Per-site traversal frontier.
//!
//! A URL moves `pending -> visited` when it is handed out in a batch, so a
//! URL that appears twice before dispatch is still fetched once.

use std::collections::{HashSet, VecDeque};

/// Pending and visited page URLs for one site traversal.
#[derive(Debug, Default)]
pub struct Frontier {
    pending: VecDeque<String>,
    queued: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    /// Creates a frontier holding only the seed URL.
    #[must_use]
    pub fn new(seed: impl Into<String>) -> Self {
        let mut frontier = Self::default();
        frontier.push(seed);
        frontier
    }

    /// Queues a URL unless it is already pending or visited.
    pub fn push(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.visited.contains(&url) || !self.queued.insert(url.clone()) {
            return false;
        }
        self.pending.push_back(url);
        true
    }

    /// Takes up to `limit` pending URLs in FIFO order and marks them visited.
    pub fn next_batch(&mut self, limit: usize) -> Vec<String> {
        let mut batch = Vec::with_capacity(limit.min(self.pending.len()));
        while batch.len() < limit {
            let Some(url) = self.pending.pop_front() else {
                break;
            };
            self.queued.remove(&url);
            if self.visited.insert(url.clone()) {
                batch.push(url);
            }
        }
        batch
    }

    /// True when nothing is left to fetch.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// URLs handed out so far.
    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// URLs waiting to be handed out.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
