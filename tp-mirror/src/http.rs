//! Shared HTTP access for resolution and downloads.
//!
//! Every request carries Basic auth when credentials are configured. A 404 on a
//! probe is the caller's branch signal and never an error; transient failures
//! (transport errors, 408, 429, 5xx) are retried up to the configured bound.

use crate::config::{Credentials, DownloadSettings};
use crate::utils::{MirrorError, Result};
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = concat!("tp-mirror/", env!("CARGO_PKG_VERSION"));

/// HTTP client wrapper shared read-only by the resolver and all download workers
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    credentials: Option<Credentials>,
    settings: DownloadSettings,
}

impl HttpFetcher {
    pub fn new(settings: &DownloadSettings, credentials: Option<Credentials>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.connect_timeout());
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            credentials,
            settings: settings.clone(),
        })
    }

    fn request(&self, url: &Url) -> RequestBuilder {
        let request = self.client.get(url.clone());
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    async fn send(&self, url: &Url) -> Result<Response> {
        let response = self.request(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn with_retry<T, F, Fut>(&self, url: &Url, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.settings.retry_count => {
                    attempt += 1;
                    let delay = self.settings.retry_delay(attempt);
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        url,
                        attempt,
                        self.settings.retry_count + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch an optional resource. `None` means it does not exist.
    pub async fn probe(&self, url: &Url) -> Result<Option<Bytes>> {
        let result = self
            .with_retry(url, || self.fetch_bytes_once(url))
            .await;

        match result {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.is_not_found() => {
                debug!("Probe miss: {}", url);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a required resource as text
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        self.with_retry(url, || self.fetch_text_once(url)).await
    }

    async fn fetch_bytes_once(&self, url: &Url) -> Result<Bytes> {
        Ok(self.send(url).await?.bytes().await?)
    }

    async fn fetch_text_once(&self, url: &Url) -> Result<String> {
        Ok(self.send(url).await?.text().await?)
    }

    /// Stream a remote file to `path`, creating parent directories as needed.
    /// Returns the number of bytes written.
    pub async fn download_to(&self, url: &Url, path: &Path) -> Result<u64> {
        self.with_retry(url, || self.download_once(url, path)).await
    }

    async fn download_once(&self, url: &Url, path: &Path) -> Result<u64> {
        let response = self.send(url).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = partial_path(path);
        let written = match write_body(response, &temp_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&temp_path, path).await?;
        Ok(written)
    }
}

async fn write_body(response: Response, temp_path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(temp_path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

/// `<name>.part` next to the final file
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

fn is_transient(error: &MirrorError) -> bool {
    match error {
        MirrorError::HttpStatus { status, .. } => {
            matches!(status, 408 | 429) || (500..=599).contains(status)
        }
        MirrorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher(retry_count: u32) -> HttpFetcher {
        let settings = DownloadSettings {
            retry_count,
            retry_delay_ms: 1,
            ..DownloadSettings::default()
        };
        HttpFetcher::new(&settings, None).unwrap()
    }

    fn url(server: &mockito::Server, path: &str) -> Url {
        Url::parse(&format!("{}{}", server.url(), path)).unwrap()
    }

    #[tokio::test]
    async fn test_probe_miss_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repo/compositeContent.jar")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let result = fetcher(3)
            .probe(&url(&server, "/repo/compositeContent.jar"))
            .await
            .unwrap();
        assert!(result.is_none());
        _m.assert_async().await;
    }

    #[tokio::test]
    async fn test_probe_other_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repo/content.jar")
            .with_status(403)
            .create_async()
            .await;

        let err = fetcher(0)
            .probe(&url(&server, "/repo/content.jar"))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::HttpStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_transient_status_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/repo/")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let err = fetcher(1).fetch_text(&url(&server, "/repo/")).await.unwrap_err();
        assert!(matches!(err, MirrorError::HttpStatus { status: 503, .. }));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_is_attached() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repo/")
            .match_header("authorization", "Basic YWxpY2U6c2VjcmV0")
            .with_status(200)
            .with_body("<html></html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(
            &DownloadSettings::default(),
            Some(Credentials::new("alice", "secret")),
        )
        .unwrap();
        let body = fetcher.fetch_text(&url(&server, "/repo/")).await.unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn test_download_to_creates_parents() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repo/plugins/a_1.0.jar")
            .with_status(200)
            .with_body("jar bytes")
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("plugins/a_1.0.jar");
        let written = fetcher(0)
            .download_to(&url(&server, "/repo/plugins/a_1.0.jar"), &target)
            .await
            .unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&target).unwrap(), b"jar bytes");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repo/missing.jar")
            .with_status(500)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("missing.jar");
        assert!(fetcher(0)
            .download_to(&url(&server, "/repo/missing.jar"), &target)
            .await
            .is_err());
        assert!(!target.exists());
    }
}
