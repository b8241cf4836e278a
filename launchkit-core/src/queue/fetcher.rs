//! Byte sources for the download queue.
//!
//! [`HttpFetcher`] streams over reqwest with URL validation; tests plug in an
//! in-memory fetcher instead.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Fetches remote content.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads a resource into memory.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Downloads a resource into a file and returns the number of bytes
    /// written. Parent directories are created as needed.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let bytes = self.fetch(url).await?;
        ensure_parent(dest).await?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(bytes.len() as u64)
    }
}

async fn ensure_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

// ============================================================================
// URL Validation
// ============================================================================

/// Validates that a URL is safe for downloading.
///
/// Checks:
/// - URL scheme must be HTTPS
/// - Host must be present, and in the allow-list when one is configured
fn validate_url(url_str: &str, allowed_hosts: Option<&[String]>) -> Result<()> {
    let url = Url::parse(url_str).with_context(|| format!("Invalid URL: {}", url_str))?;

    if url.scheme() != "https" {
        anyhow::bail!("URL must use HTTPS: {}", url_str);
    }

    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL must have a host: {}", url_str))?;

    if let Some(allowed) = allowed_hosts {
        let is_allowed = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)));
        if !is_allowed {
            anyhow::bail!("Download host not allowed: {}. Allowed: {:?}", host, allowed);
        }
    }

    Ok(())
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// Streaming HTTPS fetcher.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
    allowed_hosts: Option<Vec<String>>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts downloads to the given hosts and their subdomains.
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        validate_url(url, self.allowed_hosts.as_deref())?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to start download from {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!(
                "Download failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown error")
            );
        }

        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        let response = self.get(url).await?;
        debug!("Content-Length: {:?}", response.content_length());

        ensure_parent(dest).await?;
        let mut file = File::create(dest)
            .await
            .with_context(|| format!("Failed to create file: {}", dest.display()))?;

        let mut stream = response.bytes_stream();
        let mut bytes_downloaded: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.with_context(|| "Failed to read chunk from response stream")?;
            file.write_all(&chunk)
                .await
                .with_context(|| "Failed to write chunk to file")?;
            bytes_downloaded += chunk.len() as u64;
        }

        file.flush().await.context("Failed to flush file")?;

        debug!(
            "Download complete: {} bytes written to {}",
            bytes_downloaded,
            dest.display()
        );
        Ok(bytes_downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedFetcher(&'static [u8]);

    #[async_trait]
    impl Fetcher for FixedFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(self.0.to_vec())
        }
    }

    #[test]
    fn test_validate_url_https_required() {
        assert!(validate_url("http://libraries.minecraft.net/a.jar", None).is_err());
        assert!(validate_url("https://libraries.minecraft.net/a.jar", None).is_ok());
    }

    #[test]
    fn test_validate_url_allowed_hosts() {
        let allowed = vec!["minecraft.net".to_string()];
        assert!(validate_url("https://libraries.minecraft.net/a.jar", Some(&allowed)).is_ok());
        assert!(validate_url("https://evil.com/a.jar", Some(&allowed)).is_err());
        assert!(validate_url("https://minecraft.net.evil.org/a.jar", Some(&allowed)).is_err());
    }

    #[test]
    fn test_validate_url_invalid() {
        assert!(validate_url("not-a-url", None).is_err());
        assert!(validate_url("", None).is_err());
        assert!(validate_url("file:///etc/passwd", None).is_err());
    }

    #[test]
    fn test_default_fetch_to_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("deep/nested/file.bin");

        let written = tokio_test::block_on(
            FixedFetcher(b"hello").fetch_to_file("https://example.com/file.bin", &dest),
        )
        .unwrap();

        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn test_http_fetcher_rejects_before_network() {
        let fetcher = HttpFetcher::new().with_allowed_hosts(["minecraft.net"]);
        let result = tokio_test::block_on(fetcher.fetch("https://evil.com/a.jar"));
        assert!(result.is_err());
    }
}
