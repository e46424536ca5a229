//! Site identifiers derived from a URL's network location.
//!
//! A site identifier doubles as the crawl scope key, the tracking-store key
//! and the per-site directory name under the downloads root, so it must be
//! safe as a single path component on every platform.

use url::Url;

/// Identifier used when a URL has no usable network location.
pub const UNKNOWN_SITE: &str = "unknown";

/// Characters that are not allowed in directory names on common filesystems.
const PROBLEMATIC_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Derives the sanitized site identifier for a URL.
///
/// The identifier is the lowercased host, with `_port` appended when the URL
/// carries a non-default port. Paths, queries and fragments never affect it.
///
/// ```
/// use harvester_core::site::site_id;
///
/// assert_eq!(site_id("https://Example.COM/a/b#frag"), "example.com");
/// assert_eq!(site_id("http://localhost:8080/"), "localhost_8080");
/// assert_eq!(site_id("not a url"), "unknown");
/// ```
#[must_use]
pub fn site_id(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map_or_else(|| UNKNOWN_SITE.to_string(), |parsed| site_id_for(&parsed))
}

/// Same as [`site_id`] for an already parsed URL.
#[must_use]
pub fn site_id_for(url: &Url) -> String {
    let Some(host) = url.host_str() else {
        return UNKNOWN_SITE.to_string();
    };
    let netloc = match url.port() {
        Some(port) => format!("{}_{port}", host.to_lowercase()),
        None => host.to_lowercase(),
    };
    sanitize_site_name(&netloc)
}

/// Makes a network location safe for use as a directory name.
///
/// Problematic characters become `_`, leading/trailing dots and spaces are
/// stripped, and an empty result maps to [`UNKNOWN_SITE`].
#[must_use]
pub fn sanitize_site_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if PROBLEMATIC_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        UNKNOWN_SITE.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_ignores_path_query_and_fragment() {
        let a = site_id("https://example.com/one?x=1#top");
        let b = site_id("https://example.com/two/three.html");
        assert_eq!(a, b);
        assert_eq!(a, "example.com");
    }

    #[test]
    fn test_site_id_is_case_insensitive() {
        assert_eq!(site_id("https://EXAMPLE.com/"), site_id("https://example.COM/"));
    }

    #[test]
    fn test_site_id_keeps_explicit_port() {
        assert_eq!(site_id("http://127.0.0.1:5000/index"), "127.0.0.1_5000");
    }

    #[test]
    fn test_site_id_default_port_collapses() {
        assert_eq!(site_id("http://example.com:80/"), site_id("http://example.com/"));
    }

    #[test]
    fn test_site_id_onion_host() {
        assert_eq!(
            site_id("http://abcdefghijklmnop.onion/files/"),
            "abcdefghijklmnop.onion"
        );
    }

    #[test]
    fn test_site_id_without_host_is_unknown() {
        assert_eq!(site_id("mailto:someone@example.com"), UNKNOWN_SITE);
        assert_eq!(site_id(""), UNKNOWN_SITE);
    }

    #[test]
    fn test_sanitize_site_name_replaces_and_trims() {
        assert_eq!(sanitize_site_name("a:b|c"), "a_b_c");
        assert_eq!(sanitize_site_name(" .host. "), "host");
        assert_eq!(sanitize_site_name("..."), UNKNOWN_SITE);
    }
}
