//! Shared HTTP client for page fetches and artifact downloads.
//!
//! One [`HttpClient`] is built per run from the harvest config and cloned
//! into every task; the underlying `reqwest::Client` pools connections.
//! Each method performs exactly one attempt; retries are layered on top with
//! [`super::retry_with_backoff`].

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use super::DownloadError;
use super::constants::PARTIAL_SUFFIX;
use crate::config::HarvestConfig;

/// HTTP client with the harvest's proxy, timeouts and headers applied.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from the harvest config.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the proxy URL or an extra
    /// header is invalid.
    pub fn new(config: &HarvestConfig) -> Result<Self, DownloadError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .gzip(true)
            .user_agent(config.user_agent.as_str())
            .default_headers(build_headers(&config.extra_headers)?);

        if let Some(proxy_url) = &config.proxy {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| DownloadError::client_build(format!("proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
            info!(proxy = %proxy_url, "routing requests through proxy");
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::client_build(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetches a page body as text.
    ///
    /// # Errors
    ///
    /// Any status other than 200 is an [`DownloadError::HttpStatus`];
    /// transport failures map to `Network` or `Timeout`.
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.send(url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }

    /// Streams an artifact to `target`, returning the number of bytes written.
    ///
    /// The body is written to `<target>.part` and renamed into place only
    /// after the whole body has been flushed; on any failure the partial
    /// file is removed, so `target` exists only for complete downloads.
    ///
    /// # Errors
    ///
    /// Returns the status, transport or IO error that stopped the download.
    #[instrument(skip(self, target), fields(target = %target.display()))]
    pub async fn download_to_path(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        let response = self.send(url).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let part_path = partial_path(target);
        let result: Result<u64, DownloadError> = async {
            let mut file = File::create(&part_path)
                .await
                .map_err(|e| DownloadError::io(&part_path, e))?;
            let bytes = stream_to_file(&mut file, response, url, &part_path).await?;
            tokio::fs::rename(&part_path, target)
                .await
                .map_err(|e| DownloadError::io(target, e))?;
            Ok(bytes)
        }
        .await;

        match result {
            Ok(bytes) => {
                debug!(bytes, "artifact written");
                Ok(bytes)
            }
            Err(error) => {
                debug!(path = %part_path.display(), "cleaning up partial file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(error)
            }
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = url::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

fn build_headers(extra: &[(String, String)]) -> Result<HeaderMap, DownloadError> {
    let mut headers = HeaderMap::new();
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DownloadError::client_build(format!("header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| DownloadError::client_build(format!("header value for {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Streams a response body to an open file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;
    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(&HarvestConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
            .mount(&server)
            .await;

        let body = client()
            .fetch_text(&format!("{}/index.html", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<p>hello</p>");
    }

    #[tokio::test]
    async fn test_fetch_text_non_200_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let result = client().fetch_text(&server.uri()).await;
        assert!(matches!(result, Err(DownloadError::HttpStatus { status: 204, .. })));
    }

    #[tokio::test]
    async fn test_fetch_text_rejects_non_http_scheme() {
        let result = client().fetch_text("ftp://example.com/file").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_extra_headers_and_user_agent_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-harvest-run", "1"))
            .and(header("user-agent", "harvest-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let config = HarvestConfig {
            user_agent: "harvest-test".to_string(),
            extra_headers: vec![("X-Harvest-Run".to_string(), "1".to_string())],
            ..HarvestConfig::default()
        };
        let body = HttpClient::new(&config)
            .unwrap()
            .fetch_text(&server.uri())
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[test]
    fn test_invalid_proxy_is_client_build_error() {
        let config = HarvestConfig {
            proxy: Some("not a proxy url".to_string()),
            ..HarvestConfig::default()
        };
        assert!(matches!(
            HttpClient::new(&config),
            Err(DownloadError::ClientBuild { .. })
        ));
    }

    #[tokio::test]
    async fn test_download_to_path_writes_file_and_no_part() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a,b\n1,2\n".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("site").join("data.csv");
        let bytes = client()
            .download_to_path(&format!("{}/data.csv", server.uri()), &target)
            .await
            .unwrap();

        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n1,2\n");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_download_to_path_leaves_nothing_on_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing.csv");
        let result = client()
            .download_to_path(&format!("{}/missing.csv", server.uri()), &target)
            .await;

        assert!(matches!(result, Err(DownloadError::HttpStatus { status: 404, .. })));
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "leftover files: {entries:?}");
    }

    #[tokio::test]
    async fn test_download_to_path_times_out_without_partial_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = HarvestConfig {
            request_timeout: Duration::from_secs(1),
            ..HarvestConfig::default()
        };
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("slow.txt");
        let result = HttpClient::new(&config)
            .unwrap()
            .download_to_path(&format!("{}/slow.txt", server.uri()), &target)
            .await;

        assert!(matches!(result, Err(DownloadError::Timeout { .. })));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }
}
