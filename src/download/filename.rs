//! Filename derivation and sanitization for downloaded artifacts.
//!
//! The filename is the dedup key within a site, so the same URL must always
//! produce the same name.

use std::path::{Component, Path};

use sha2::{Digest, Sha256};
use url::Url;

/// Longest filename kept as-is.
const MAX_FILENAME_LEN: usize = 255;

/// Stem length kept when a filename is too long.
const TRUNCATED_STEM_LEN: usize = 250;

/// Extension given to hash-derived fallback names.
const FALLBACK_EXTENSION: &str = "unknown";

/// Derives the local filename for an artifact URL.
///
/// Uses the last path segment, percent-decoded and sanitized. When the URL
/// yields no name with an extension, falls back to
/// `file_<first 8 hex chars of SHA-256(url)>.unknown`.
///
/// ```
/// use harvester_core::download::filename_for_url;
///
/// assert_eq!(filename_for_url("https://x.test/a/report%20Q1.csv"), "report Q1.csv");
/// assert!(filename_for_url("https://x.test/download").starts_with("file_"));
/// ```
#[must_use]
pub fn filename_for_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| last_segment(&parsed))
        .map(|segment| sanitize_filename(&segment))
        .filter(|name| name.contains('.') && is_safe_filename_segment(name))
        .unwrap_or_else(|| hashed_filename(url))
}

/// Replaces characters invalid on common filesystems with `_` and caps the length.
///
/// Names over 255 characters keep their first 250 stem characters plus the
/// extension.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.chars().count() <= MAX_FILENAME_LEN {
        return sanitized;
    }

    let (stem, ext) = match sanitized.rfind('.') {
        Some(pos) if pos > 0 => sanitized.split_at(pos),
        _ => (sanitized.as_str(), ""),
    };
    let stem: String = stem.chars().take(TRUNCATED_STEM_LEN).collect();
    format!("{stem}{ext}")
}

fn last_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned);
    Some(decoded)
}

fn hashed_filename(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("file_{hex}.{FALLBACK_EXTENSION}")
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
