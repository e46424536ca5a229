//! CLI entry point for the harvester.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use harvester_core::config::TOR_PROXY_URL;
use harvester_core::decrypt::{FieldCipher, encrypt_file};
use harvester_core::{
    DecryptionEngine, DecryptionStats, HarvestConfig, HarvestReport, Harvester, StoreStats,
    TrackingStore, load_seed_urls,
};
use tracing::{debug, info, warn};

mod cli;

use cli::{CleanArgs, Cli, Command, CrawlArgs, EncryptArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let mut config = match &cli.config {
        Some(path) => HarvestConfig::from_file(path)?,
        None => HarvestConfig::default(),
    };
    if let Some(dir) = &cli.downloads_dir {
        config.downloads_dir.clone_from(dir);
    }
    if let Some(file) = &cli.tracking_file {
        config.tracking_file.clone_from(file);
    }

    match cli.command {
        Some(Command::Crawl(args)) => crawl(config, &args).await,
        None => crawl(config, &cli.crawl).await,
        Some(Command::Decrypt) => decrypt(&config).await,
        Some(Command::Encrypt(args)) => encrypt(&args).await,
        Some(Command::Clean(args)) => clean(&config, &args).await,
    }
}

fn apply_crawl_args(config: &mut HarvestConfig, args: &CrawlArgs) {
    if args.tor {
        config.proxy = Some(TOR_PROXY_URL.to_string());
    } else if let Some(proxy) = &args.proxy {
        config.proxy = Some(proxy.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config.max_concurrent_requests = usize::from(concurrency);
    }
    if let Some(workers) = args.workers {
        config.max_download_workers = usize::from(workers);
    }
    if let Some(pages) = args.max_pages {
        config.max_pages_per_site = usize::try_from(pages).unwrap_or(usize::MAX);
    }
    if let Some(retries) = args.retries {
        config.retry_attempts = u32::from(retries);
    }
    if let Some(secs) = args.timeout {
        config.crawl_timeout = Duration::from_secs(secs);
    }
}

async fn open_store(config: &HarvestConfig) -> Result<Arc<TrackingStore>> {
    let store = TrackingStore::load(&config.tracking_file)
        .await
        .with_context(|| format!("cannot open tracking file {}", config.tracking_file.display()))?;
    Ok(Arc::new(store))
}

async fn crawl(mut config: HarvestConfig, args: &CrawlArgs) -> Result<()> {
    apply_crawl_args(&mut config, args);
    config.validate()?;

    let seeds = load_seed_urls(&args.seeds).await?;
    if seeds.is_empty() {
        bail!("no seed URLs in {}", args.seeds.display());
    }
    info!(
        seeds = seeds.len(),
        proxy = config.proxy.as_deref().unwrap_or("none"),
        "harvester starting"
    );

    let store = open_store(&config).await?;
    let initial = store.get_stats();
    print_store_stats("Initial state", initial);

    let harvester = Harvester::new(&config, Arc::clone(&store))?;
    let report = harvester.run(&seeds).await;
    print_report(&report);
    print_store_stats("Tracked", store.get_stats());

    if args.no_decrypt {
        debug!("decryption pass disabled");
    } else {
        let stats = DecryptionEngine::new(Arc::clone(&store)).decrypt_all().await;
        print_decryption_stats(stats);
    }

    if report.summary.files_downloaded > 0 {
        println!("Downloads saved to: {}", absolute(&config.downloads_dir).display());
    }
    println!("Tracking data saved to: {}", absolute(store.path()).display());
    Ok(())
}

async fn decrypt(config: &HarvestConfig) -> Result<()> {
    let store = open_store(config).await?;
    if store.get_stats().files == 0 {
        warn!(path = %config.tracking_file.display(), "no downloads recorded");
    }
    let stats = DecryptionEngine::new(store).decrypt_all().await;
    print_decryption_stats(stats);
    Ok(())
}

async fn encrypt(args: &EncryptArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| encrypted_name(&args.input));
    let cipher = FieldCipher::from_credential(&args.key);
    encrypt_file(&args.input, &output, &cipher)
        .await
        .with_context(|| format!("cannot encrypt {}", args.input.display()))?;
    println!("Encrypted {} -> {}", args.input.display(), output.display());
    Ok(())
}

async fn clean(config: &HarvestConfig, args: &CleanArgs) -> Result<()> {
    let dir = &config.downloads_dir;
    if !args.yes {
        bail!("refusing to delete {} without --yes", dir.display());
    }
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            info!(dir = %dir.display(), "downloads directory removed");
            println!("Removed {}", dir.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("Nothing to clean at {}", dir.display());
        }
        Err(e) => return Err(e).with_context(|| format!("cannot remove {}", dir.display())),
    }
    Ok(())
}

/// `<stem>_encrypted.<ext>` next to `input`.
fn encrypted_name(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy());
    let name = match input.extension() {
        Some(ext) => format!("{stem}_encrypted.{}", ext.to_string_lossy()),
        None => format!("{stem}_encrypted"),
    };
    input.with_file_name(name)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn print_store_stats(label: &str, stats: StoreStats) {
    println!(
        "{label}: {} sites, {} files, {} keys",
        stats.sites, stats.files, stats.credentials
    );
}

fn print_report(report: &HarvestReport) {
    if report.timed_out {
        println!(
            "Crawl timed out after {:.2} seconds, partial results:",
            report.elapsed.as_secs_f64()
        );
    } else {
        println!("Crawl completed in {:.2} seconds", report.elapsed.as_secs_f64());
    }
    let summary = &report.summary;
    println!("  Pages visited:    {}", summary.pages_visited);
    println!("  Files downloaded: {}", summary.files_downloaded);
    println!("  Files skipped:    {}", summary.files_skipped);
    println!("  Keys found:       {}", summary.keys_found);
    for site in &report.sites {
        debug!(
            site = %site.site,
            pages = site.summary.pages_visited,
            pages_failed = site.pages_failed,
            files = site.summary.files_downloaded,
            files_failed = site.files_failed,
            "site report"
        );
    }
}

fn print_decryption_stats(stats: DecryptionStats) {
    println!(
        "Decryption: {} succeeded, {} failed, {} skipped, {} without keys",
        stats.success, stats.failed, stats.skipped, stats.no_keys_available
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_name_keeps_extension() {
        assert_eq!(
            encrypted_name(Path::new("data/users.csv")),
            PathBuf::from("data/users_encrypted.csv")
        );
        assert_eq!(encrypted_name(Path::new("plain")), PathBuf::from("plain_encrypted"));
    }

    #[test]
    fn test_tor_flag_sets_socks_proxy() {
        let mut config = HarvestConfig::default();
        let args = CrawlArgs {
            tor: true,
            concurrency: Some(4),
            timeout: Some(9),
            ..CrawlArgs::default()
        };
        apply_crawl_args(&mut config, &args);
        assert_eq!(config.proxy.as_deref(), Some(TOR_PROXY_URL));
        assert_eq!(config.max_concurrent_requests, 4);
        assert_eq!(config.crawl_timeout, Duration::from_secs(9));
    }
}
