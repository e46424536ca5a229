//! Credential scanning over page bodies and downloaded artifacts.
//!
//! The scanner applies an ordered list of case-insensitive patterns of the
//! form `<token> [:=] <value>` and reports every match, duplicates included.
//! Deduplication happens when credentials are merged into the tracking store.

use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Default credential patterns, tried in order.
///
/// Each pattern captures the value in group 1; the value runs until the next
/// whitespace, quote or angle bracket.
pub const DEFAULT_KEY_PATTERNS: &[&str] = &[
    r#"password\s*[:=]\s*([^\s'"<>]+)"#,
    r#"key\s*[:=]\s*([^\s'"<>]+)"#,
    r#"passkey\s*[:=]\s*([^\s'"<>]+)"#,
    r#"passwd\s*[:=]\s*([^\s'"<>]+)"#,
    r#"pwd\s*[:=]\s*([^\s'"<>]+)"#,
    r#"secret\s*[:=]\s*([^\s'"<>]+)"#,
    r#"token\s*[:=]\s*([^\s'"<>]+)"#,
];

/// How many bytes of an artifact with an unrecognized extension are scanned.
pub const DEFAULT_PREFIX_SCAN_BYTES: usize = 10_000;

/// Values shorter than this are discarded as noise.
const MIN_VALUE_LEN: usize = 3;

/// Values that mean "no credential here".
const EMPTY_SENTINELS: &[&str] = &["none", "null", "\"\"", "''"];

/// Extensions whose whole content is scanned as text.
const FULL_TEXT_EXTENSIONS: &[&str] = &["txt", "csv", "json"];

/// Binary document formats the scanner does not look into.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx"];

/// One harvested credential candidate.
///
/// Serialized as `{"type": ..., "value": ...}` in the tracking file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    /// Label taken from the text before the separator, lowercased.
    #[serde(rename = "type")]
    pub kind: String,
    /// The captured secret value.
    pub value: String,
}

impl Credential {
    /// Creates a credential from a label and a value.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// Error building a scanner from custom patterns.
#[derive(Debug, thiserror::Error)]
#[error("invalid credential pattern `{pattern}`: {source}")]
pub struct PatternError {
    /// The pattern that failed to compile.
    pub pattern: String,
    /// The underlying regex error.
    #[source]
    pub source: regex::Error,
}

/// Pattern-based credential scanner.
#[derive(Debug, Clone)]
pub struct CredentialScanner {
    patterns: Vec<Regex>,
    prefix_scan_bytes: usize,
}

impl Default for CredentialScanner {
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PATTERNS.iter().copied())
            .expect("built-in credential patterns compile")
    }
}

impl CredentialScanner {
    /// Compiles a scanner from patterns; each must capture the value in group 1.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] for the first pattern that does not compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                    .map_err(|source| PatternError {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            prefix_scan_bytes: DEFAULT_PREFIX_SCAN_BYTES,
        })
    }

    /// Overrides the prefix size used for unrecognized file types.
    #[must_use]
    pub fn with_prefix_scan_bytes(mut self, bytes: usize) -> Self {
        self.prefix_scan_bytes = bytes;
        self
    }

    /// Scans text and returns every credential match in pattern order.
    #[must_use]
    pub fn scan_text(&self, text: &str) -> Vec<Credential> {
        let mut found = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(text) {
                let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let value = value.as_str();
                if is_noise(value) {
                    continue;
                }
                found.push(Credential::new(label_of(whole.as_str()), value));
            }
        }
        found
    }

    /// Scans a downloaded artifact according to its extension.
    ///
    /// Plain text, CSV and JSON are read in full; PDF and DOCX are skipped;
    /// anything else has only its first bytes inspected. Read failures are
    /// logged and yield no credentials.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn scan_file(&self, path: &Path) -> Vec<Credential> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if UNSUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            info!(extension = %extension, "credential extraction not supported for this format");
            return Vec::new();
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "could not read artifact for credential scan");
                return Vec::new();
            }
        };

        let scanned = if FULL_TEXT_EXTENSIONS.contains(&extension.as_str()) {
            &bytes[..]
        } else {
            debug!(limit = self.prefix_scan_bytes, "prefix scan of unrecognized type");
            &bytes[..bytes.len().min(self.prefix_scan_bytes)]
        };
        self.scan_text(&String::from_utf8_lossy(scanned))
    }
}

/// Label is the matched text before the first `:` or `=`, trimmed and lowercased.
fn label_of(matched: &str) -> String {
    matched
        .split([':', '='])
        .next()
        .unwrap_or(matched)
        .trim()
        .to_lowercase()
}

fn is_noise(value: &str) -> bool {
    value.chars().count() < MIN_VALUE_LEN
        || EMPTY_SENTINELS
            .iter()
            .any(|sentinel| value.eq_ignore_ascii_case(sentinel))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_text_extracts_password() {
        let found = CredentialScanner::default().scan_text("password: Secr3tK");
        assert_eq!(found, vec![Credential::new("password", "Secr3tK")]);
    }

    #[test]
    fn test_scan_text_is_case_insensitive_and_lowercases_label() {
        let found = CredentialScanner::default().scan_text("SECRET=hunter22");
        assert_eq!(found, vec![Credential::new("secret", "hunter22")]);
    }

    #[test]
    fn test_scan_text_value_stops_at_quote_bracket_or_space() {
        let scanner = CredentialScanner::default();
        assert_eq!(scanner.scan_text("token=abc123<br>")[0].value, "abc123");
        assert_eq!(scanner.scan_text("token = abc123 rest")[0].value, "abc123");
        assert_eq!(scanner.scan_text("pwd:'quoted'"), Vec::new());
    }

    #[test]
    fn test_scan_text_drops_short_and_sentinel_values() {
        let scanner = CredentialScanner::default();
        assert!(scanner.scan_text("password: ab").is_empty());
        assert!(scanner.scan_text("password: None").is_empty());
        assert!(scanner.scan_text("password=NULL").is_empty());
    }

    #[test]
    fn test_scan_text_keeps_duplicates_in_pattern_order() {
        let text = "passkey: abcdef\npassword: one111\npassword: one111";
        let found = CredentialScanner::default().scan_text(text);
        let kinds: Vec<&str> = found.iter().map(|c| c.kind.as_str()).collect();
        // `key` also matches the tail of `passkey`.
        assert_eq!(kinds, vec!["password", "password", "key", "passkey"]);
    }

    #[test]
    fn test_custom_pattern_rejected_when_invalid() {
        let err = CredentialScanner::new(["api(key"]).unwrap_err();
        assert!(err.to_string().contains("api(key"));
    }

    #[test]
    fn test_credential_serializes_with_type_field() {
        let json = serde_json::to_string(&Credential::new("key", "value1")).unwrap();
        assert_eq!(json, r#"{"type":"key","value":"value1"}"#);
    }

    #[tokio::test]
    async fn test_scan_file_reads_text_formats_fully() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        let mut content = "x".repeat(20_000);
        content.push_str("\nsecret: deepvalue\n");
        std::fs::write(&path, content).unwrap();

        let found = CredentialScanner::default().scan_file(&path).await;
        assert_eq!(found, vec![Credential::new("secret", "deepvalue")]);
    }

    #[tokio::test]
    async fn test_scan_file_limits_unknown_types_to_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.zip");
        let mut content = b"token=early1 ".to_vec();
        content.extend(std::iter::repeat_n(b'x', 200));
        content.extend_from_slice(b" token=late22");
        std::fs::write(&path, content).unwrap();

        let scanner = CredentialScanner::default().with_prefix_scan_bytes(100);
        let found = scanner.scan_file(&path).await;
        assert_eq!(found, vec![Credential::new("token", "early1")]);
    }

    #[tokio::test]
    async fn test_scan_file_skips_pdf_and_docx() {
        let dir = TempDir::new().unwrap();
        for name in ["doc.pdf", "doc.docx"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "password: visible1").unwrap();
            assert!(CredentialScanner::default().scan_file(&path).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_scan_file_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let found = CredentialScanner::default()
            .scan_file(&dir.path().join("gone.txt"))
            .await;
        assert!(found.is_empty());
    }
}
