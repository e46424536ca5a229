//! Harvest configuration: defaults, validation and `key = value` file loading.
//!
//! A config file is a flat list of `key = value` lines. Strings are quoted,
//! integers and booleans are bare, `#` starts a comment. Unknown keys are
//! rejected so typos do not silently fall back to defaults.
//!
//! ```text
//! downloads_dir = "loot"
//! max_pages_per_site = 250
//! proxy = "socks5h://127.0.0.1:9050"
//! header = "X-Forwarded-For: 10.0.0.1"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::links::DEFAULT_ARTIFACT_EXTENSIONS;
use crate::scanner::{DEFAULT_KEY_PATTERNS, DEFAULT_PREFIX_SCAN_BYTES};

/// Default downloads root.
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";

/// Default tracking file.
pub const DEFAULT_TRACKING_FILE: &str = "downloads.json";

/// Proxy used when routing through a local Tor daemon.
pub const TOR_PROXY_URL: &str = "socks5h://127.0.0.1:9050";

/// Browser-like User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default page budget per site.
pub const DEFAULT_MAX_PAGES_PER_SITE: usize = 100;

/// Default ceiling on concurrent page fetches.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Default size of the artifact download pool.
pub const DEFAULT_MAX_DOWNLOAD_WORKERS: usize = 5;

/// Default attempts per request, including the first.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default wall-clock ceiling for a whole crawl in seconds.
pub const DEFAULT_CRAWL_TIMEOUT_SECS: u64 = 300;

/// Configuration validation and loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A numeric setting is outside its allowed range.
    #[error("invalid value for `{field}`: {value}. Expected range: {min}..={max}")]
    OutOfRange {
        /// Setting name.
        field: &'static str,
        /// Rejected value.
        value: u64,
        /// Inclusive minimum.
        min: u64,
        /// Inclusive maximum.
        max: u64,
    },

    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A config line could not be parsed.
    #[error("invalid config on line {line}: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

/// Settings shared by the crawl, download and decryption stages.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root directory for per-site artifact folders.
    pub downloads_dir: PathBuf,
    /// JSON tracking file.
    pub tracking_file: PathBuf,
    /// Artifact extension allow-list.
    pub artifact_extensions: Vec<String>,
    /// Credential patterns, tried in order.
    pub key_patterns: Vec<String>,
    /// Bytes scanned from artifacts of unrecognized type.
    pub prefix_scan_bytes: usize,
    /// Optional proxy URL (`socks5h://`, `http://`, ...).
    pub proxy: Option<String>,
    /// User-Agent header value.
    pub user_agent: String,
    /// Extra headers injected into every request.
    pub extra_headers: Vec<(String, String)>,
    /// Timeout for a single request, body included.
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Attempts per request, including the first.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Page budget per site traversal.
    pub max_pages_per_site: usize,
    /// Concurrent page fetches across all sites.
    pub max_concurrent_requests: usize,
    /// Artifact download pool size.
    pub max_download_workers: usize,
    /// Wall-clock ceiling for the whole crawl.
    pub crawl_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            tracking_file: PathBuf::from(DEFAULT_TRACKING_FILE),
            artifact_extensions: DEFAULT_ARTIFACT_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            key_patterns: DEFAULT_KEY_PATTERNS.iter().map(ToString::to_string).collect(),
            prefix_scan_bytes: DEFAULT_PREFIX_SCAN_BYTES,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_headers: Vec::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: Duration::from_secs(1),
            max_pages_per_site: DEFAULT_MAX_PAGES_PER_SITE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_download_workers: DEFAULT_MAX_DOWNLOAD_WORKERS,
            crawl_timeout: Duration::from_secs(DEFAULT_CRAWL_TIMEOUT_SECS),
        }
    }
}

impl HarvestConfig {
    /// Checks every bounded setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_concurrent_requests", self.max_concurrent_requests as u64, 1, 100)?;
        check_range("max_download_workers", self.max_download_workers as u64, 1, 50)?;
        check_range("max_pages_per_site", self.max_pages_per_site as u64, 1, 1_000_000)?;
        check_range("retry_attempts", u64::from(self.retry_attempts), 1, 10)?;
        check_range("request_timeout_secs", self.request_timeout.as_secs(), 1, 3600)?;
        check_range("connect_timeout_secs", self.connect_timeout.as_secs(), 1, 3600)?;
        check_range("crawl_timeout_secs", self.crawl_timeout.as_secs(), 1, 86_400)?;
        Ok(())
    }

    /// Loads a config file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Syntax`] for malformed lines or unknown keys.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::default();
        config.apply_config_str(&raw)?;
        Ok(config)
    }

    /// Applies `key = value` lines to this config.
    ///
    /// `artifact_extension`, `key_pattern` and `header` may repeat; the first
    /// occurrence of each replaces the built-in list, later ones append.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Syntax`] on the first bad line.
    pub fn apply_config_str(&mut self, raw: &str) -> Result<(), ConfigError> {
        let mut replaced_extensions = false;
        let mut replaced_patterns = false;

        for (index, raw_line) in raw.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(syntax(line_no, "expected key = value"));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "downloads_dir" => self.downloads_dir = PathBuf::from(string(line_no, value)?),
                "tracking_file" => self.tracking_file = PathBuf::from(string(line_no, value)?),
                "proxy" => {
                    let proxy = string(line_no, value)?;
                    self.proxy = (!proxy.is_empty()).then_some(proxy);
                }
                "user_agent" => self.user_agent = string(line_no, value)?,
                "header" => {
                    let header = string(line_no, value)?;
                    let Some((name, val)) = header.split_once(':') else {
                        return Err(syntax(line_no, "header must look like \"Name: value\""));
                    };
                    self.extra_headers
                        .push((name.trim().to_string(), val.trim().to_string()));
                }
                "artifact_extension" => {
                    if !replaced_extensions {
                        self.artifact_extensions.clear();
                        replaced_extensions = true;
                    }
                    self.artifact_extensions.push(string(line_no, value)?);
                }
                "key_pattern" => {
                    if !replaced_patterns {
                        self.key_patterns.clear();
                        replaced_patterns = true;
                    }
                    self.key_patterns.push(string(line_no, value)?);
                }
                "prefix_scan_bytes" => self.prefix_scan_bytes = usize_value(line_no, value)?,
                "request_timeout_secs" => {
                    self.request_timeout = Duration::from_secs(integer(line_no, value)?);
                }
                "connect_timeout_secs" => {
                    self.connect_timeout = Duration::from_secs(integer(line_no, value)?);
                }
                "retry_attempts" => {
                    self.retry_attempts = u32::try_from(integer(line_no, value)?)
                        .map_err(|_| syntax(line_no, "retry_attempts out of range"))?;
                }
                "retry_base_delay_ms" => {
                    self.retry_base_delay = Duration::from_millis(integer(line_no, value)?);
                }
                "max_pages_per_site" => self.max_pages_per_site = usize_value(line_no, value)?,
                "max_concurrent_requests" => {
                    self.max_concurrent_requests = usize_value(line_no, value)?;
                }
                "max_download_workers" => {
                    self.max_download_workers = usize_value(line_no, value)?;
                }
                "crawl_timeout_secs" => {
                    self.crawl_timeout = Duration::from_secs(integer(line_no, value)?);
                }
                "use_tor" => {
                    if boolean(line_no, value)? {
                        self.proxy = Some(TOR_PROXY_URL.to_string());
                    }
                }
                other => return Err(syntax(line_no, &format!("unknown key `{other}`"))),
            }
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn syntax(line: usize, message: &str) -> ConfigError {
    ConfigError::Syntax {
        line,
        message: message.to_string(),
    }
}

/// Drops a `#` comment that is not inside a quoted string.
fn strip_inline_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..index],
            _ => {}
        }
    }
    line
}

fn string(line: usize, value: &str) -> Result<String, ConfigError> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(ToString::to_string)
        .ok_or_else(|| syntax(line, "expected a quoted string"))
}

fn integer(line: usize, value: &str) -> Result<u64, ConfigError> {
    value
        .replace('_', "")
        .parse::<u64>()
        .map_err(|_| syntax(line, "expected a non-negative integer"))
}

fn usize_value(line: usize, value: &str) -> Result<usize, ConfigError> {
    usize::try_from(integer(line, value)?).map_err(|_| syntax(line, "integer too large"))
}

fn boolean(line: usize, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(syntax(line, "expected true or false")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HarvestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.max_pages_per_site, 100);
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.max_download_workers, 5);
        assert_eq!(config.artifact_extensions.len(), 9);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = HarvestConfig {
            max_concurrent_requests: 0,
            ..HarvestConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_requests"));
    }

    #[test]
    fn test_validate_rejects_too_many_attempts() {
        let config = HarvestConfig {
            retry_attempts: 11,
            ..HarvestConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "retry_attempts", .. })
        ));
    }

    #[test]
    fn test_apply_config_str_overrides_values() {
        let mut config = HarvestConfig::default();
        config
            .apply_config_str(
                r#"
                # harvest settings
                downloads_dir = "loot"   # trailing comment
                max_pages_per_site = 1_000
                retry_base_delay_ms = 250
                use_tor = true
                header = "X-Token: abc#def"
                "#,
            )
            .unwrap();
        assert_eq!(config.downloads_dir, PathBuf::from("loot"));
        assert_eq!(config.max_pages_per_site, 1000);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.proxy.as_deref(), Some(TOR_PROXY_URL));
        assert_eq!(
            config.extra_headers,
            vec![("X-Token".to_string(), "abc#def".to_string())]
        );
    }

    #[test]
    fn test_repeated_list_keys_replace_then_append() {
        let mut config = HarvestConfig::default();
        config
            .apply_config_str("artifact_extension = \".sql\"\nartifact_extension = \".bak\"")
            .unwrap();
        assert_eq!(config.artifact_extensions, vec![".sql", ".bak"]);
    }

    #[test]
    fn test_unknown_key_is_rejected_with_line_number() {
        let mut config = HarvestConfig::default();
        let err = config.apply_config_str("\nmax_pagez = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_unquoted_string_is_rejected() {
        let mut config = HarvestConfig::default();
        assert!(config.apply_config_str("proxy = socks5://x").is_err());
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let err = HarvestConfig::from_file(Path::new("/definitely/not/here.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
