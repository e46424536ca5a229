//! Shared fixtures for integration tests: temp workspaces and mock sites.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use harvester_core::{HarvestConfig, TrackingStore};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A temp directory holding a downloads root and a tracking file.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    pub fn tracking_file(&self) -> PathBuf {
        self.dir.path().join("downloads.json")
    }

    /// Fast-failing config rooted in this workspace.
    pub fn config(&self) -> HarvestConfig {
        HarvestConfig {
            downloads_dir: self.downloads_dir(),
            tracking_file: self.tracking_file(),
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            crawl_timeout: Duration::from_secs(30),
            ..HarvestConfig::default()
        }
    }

    pub async fn store(&self) -> Arc<TrackingStore> {
        Arc::new(
            TrackingStore::load(self.tracking_file())
                .await
                .expect("load tracking store"),
        )
    }
}

/// Serves `body` as HTML at `at`.
pub async fn mount_page(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Serves raw bytes at `at`.
pub async fn mount_file(server: &MockServer, at: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}
