//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Crawl seed sites, harvest artifacts and leaked keys, decrypt what they unlock.
///
/// Without a subcommand, `harvester` crawls the sites listed in the seed file
/// and then runs the decryption pass.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Read settings from a `key = value` config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root directory for downloaded artifacts
    #[arg(long, global = true, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Tracking file of downloads and credentials
    #[arg(long, global = true, value_name = "PATH")]
    pub tracking_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub crawl: CrawlArgs,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl seed sites, download artifacts, then decrypt
    Crawl(CrawlArgs),

    /// Run only the decryption pass over the tracking file
    Decrypt,

    /// Encrypt a CSV file field by field with a key
    Encrypt(EncryptArgs),

    /// Delete the downloads directory
    Clean(CleanArgs),
}

/// Options for a crawl.
#[derive(Args, Debug, Clone, Default)]
pub struct CrawlArgs {
    /// JSON seed file: an array of URLs or {"urls": [...]}
    #[arg(value_name = "SEEDS", default_value = "urls.json")]
    pub seeds: PathBuf,

    /// Route all traffic through the local Tor SOCKS proxy
    #[arg(long, conflicts_with = "proxy")]
    pub tor: bool,

    /// Route all traffic through this proxy URL
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Maximum concurrent page fetches (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Size of the artifact download pool (1-50)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=50))]
    pub workers: Option<u8>,

    /// Page budget per site
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Attempts per request, including the first (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub retries: Option<u8>,

    /// Wall-clock ceiling for the whole crawl in seconds
    #[arg(short = 't', long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub timeout: Option<u64>,

    /// Skip the decryption pass after crawling
    #[arg(long)]
    pub no_decrypt: bool,
}

/// Options for `encrypt`.
#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// CSV file to encrypt
    pub input: PathBuf,

    /// Output file (default: <stem>_encrypted.<ext> next to the input)
    pub output: Option<PathBuf>,

    /// Key text; padded or truncated to 8 bytes
    #[arg(short, long)]
    pub key: String,
}

/// Options for `clean`.
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Confirm deletion
    #[arg(short, long)]
    pub yes: bool,
}
