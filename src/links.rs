//! Link discovery for crawled pages.
//!
//! Links are pulled out of `href`, `src` and `download` attributes with
//! regular expressions rather than a full HTML parser; pages are treated as
//! plain text and a malformed link never stops classification.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use crate::site::site_id_for;

/// Extensions that mark a link as a downloadable artifact.
pub const DEFAULT_ARTIFACT_EXTENSIONS: &[&str] = &[
    ".csv", ".txt", ".json", ".xlsx", ".xls", ".zip", ".rar", ".pdf", ".docx",
];

/// Schemes that never lead to a fetchable resource.
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "file:"];

#[allow(clippy::expect_used)]
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern compiles")
});

#[allow(clippy::expect_used)]
static ASSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:href|src|download)\s*=\s*["']([^"']+)["']"#)
        .expect("asset pattern compiles")
});

#[allow(clippy::expect_used)]
static DRIVE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]:[\\/]").expect("drive path pattern compiles"));

/// Links found on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedLinks {
    /// Same-site navigable pages, absolute, fragment stripped.
    pub pages: HashSet<String>,
    /// Artifact URLs matching the extension allow-list, on any site.
    pub artifacts: HashSet<String>,
}

/// Splits page links into navigable pages and downloadable artifacts.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    extensions: Vec<String>,
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ARTIFACT_EXTENSIONS.iter().copied())
    }
}

impl LinkClassifier {
    /// Creates a classifier with a custom extension allow-list.
    ///
    /// Extensions are matched case-insensitively against the end of the URL
    /// path; a missing leading dot is added.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.as_ref().trim().to_lowercase();
                if ext.starts_with('.') { ext } else { format!(".{ext}") }
            })
            .filter(|ext| ext.len() > 1)
            .collect();
        Self { extensions }
    }

    /// Returns true if the URL path ends with an allow-listed extension.
    #[must_use]
    pub fn is_artifact(&self, url: &Url) -> bool {
        let path = url.path().to_lowercase();
        self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }

    /// Classifies every link on a page fetched from `page_url`.
    ///
    /// Returns empty sets when `page_url` itself does not parse.
    #[must_use]
    pub fn classify(&self, content: &str, page_url: &str) -> ClassifiedLinks {
        let mut links = ClassifiedLinks::default();
        let Ok(base) = Url::parse(page_url) else {
            return links;
        };
        let site = site_id_for(&base);

        for raw in capture_values(&ASSET_RE, content) {
            if let Some(url) = resolve(&base, raw)
                && self.is_artifact(&url)
            {
                links.artifacts.insert(url.to_string());
            }
        }

        for raw in capture_values(&HREF_RE, content) {
            let Some(mut url) = resolve(&base, raw) else {
                continue;
            };
            if self.is_artifact(&url) || site_id_for(&url) != site {
                continue;
            }
            url.set_fragment(None);
            links.pages.insert(url.to_string());
        }

        links
    }
}

fn capture_values<'a>(re: &Regex, content: &'a str) -> impl Iterator<Item = &'a str> {
    re.captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Resolves a raw attribute value against the page URL.
///
/// Returns `None` for non-fetchable schemes, local filesystem paths and
/// anything that does not end up as an absolute http(s) URL with a host.
fn resolve(base: &Url, raw: &str) -> Option<Url> {
    if raw.is_empty() || raw.starts_with('#') || is_local_path(raw) {
        return None;
    }
    let lowered = raw.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return None;
    }

    let url = match base.join(raw) {
        Ok(url) => url,
        Err(error) => {
            trace!(link = raw, %error, "dropping malformed link");
            return None;
        }
    };
    let fetchable = matches!(url.scheme(), "http" | "https") && url.host_str().is_some();
    fetchable.then_some(url)
}

fn is_local_path(raw: &str) -> bool {
    raw.starts_with('\\') || raw.contains(":\\") || DRIVE_PATH_RE.is_match(raw)
}
