//! Harvester Core Library
//!
//! Crawls seed sites, downloads the artifacts they link to, harvests
//! credentials from pages and artifacts, and decrypts CSV artifacts with the
//! credentials found on the same site.
//!
//! # Architecture
//!
//! - [`site`] - site identifiers used to scope crawls and group records
//! - [`links`] - page/artifact link classification
//! - [`scanner`] - credential pattern scanning of text and files
//! - [`store`] - write-through tracking file of downloads and credentials
//! - [`download`] - HTTP client, retry policy and the artifact download engine
//! - [`crawl`] - per-site traversal and the multi-site harvest run
//! - [`decrypt`] - field cipher and the decryption pass
//! - [`config`] - configuration defaults, validation and file loading
//! - [`seeds`] - seed URL documents

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod decrypt;
pub mod download;
pub mod links;
pub mod scanner;
pub mod seeds;
pub mod site;
pub mod store;

// Re-export commonly used types
pub use config::{ConfigError, HarvestConfig};
pub use crawl::{CrawlEngine, HarvestReport, HarvestStats, HarvestSummary, Harvester, SiteReport};
pub use decrypt::{DecryptionEngine, DecryptionStats, FieldCipher};
pub use download::{DownloadEngine, DownloadError, HttpClient, RetryPolicy};
pub use links::LinkClassifier;
pub use scanner::{Credential, CredentialScanner};
pub use seeds::{SeedError, load_seed_urls};
pub use store::{StoreStats, TrackingStore};
