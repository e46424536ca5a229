//! Page fetching and artifact downloading.
//!
//! [`HttpClient`] performs single attempts, [`retry_with_backoff`] layers
//! the shared backoff discipline on top, and [`DownloadEngine`] runs the
//! dedup-fetch-record-scan pipeline for a site's artifacts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harvester_core::config::HarvestConfig;
//! use harvester_core::download::{DownloadEngine, HttpClient, RetryPolicy};
//! use harvester_core::scanner::CredentialScanner;
//! use harvester_core::store::TrackingStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::default();
//! let store = Arc::new(TrackingStore::load(&config.tracking_file).await?);
//! let engine = DownloadEngine::new(
//!     HttpClient::new(&config)?,
//!     store,
//!     Arc::new(CredentialScanner::default()),
//!     RetryPolicy::from_config(&config),
//!     &config.downloads_dir,
//!     config.max_download_workers,
//! );
//! let summary = engine
//!     .download_files("example.com", ["https://example.com/report.csv".to_string()], None)
//!     .await;
//! println!("downloaded {}, skipped {}", summary.downloaded, summary.skipped);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod retry;

pub use client::HttpClient;
pub use constants::PARTIAL_SUFFIX;
pub use engine::{DownloadEngine, DownloadSummary};
pub use error::DownloadError;
pub use filename::{filename_for_url, sanitize_filename};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, retry_with_backoff};
