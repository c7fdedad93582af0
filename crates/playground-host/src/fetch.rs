//! Retrieval of compiler module bytes.
//!
//! [`HttpFetcher`] implements [`ModuleFetcher`] over HTTP(S) with a shared,
//! connection-pooled client. `file://` URLs are read from disk, which lets a
//! locally built module stand in for a published one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use playground_common::{ArtifactConfig, ModuleError, PackageManifest, PlaygroundError};
use playground_core::ModuleFetcher;

/// Module fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// HTTP client (shared, connection pooled).
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with reasonable defaults.
    ///
    /// Module artifacts are tens of megabytes, so only connecting is
    /// time-limited.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, PlaygroundError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("playground/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlaygroundError::invalid_config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Look up the registry document for `version` and return the manifest
    /// naming its tarball.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Fetch`] if the document cannot be retrieved or
    /// does not name a tarball.
    #[instrument(skip(self, artifact))]
    pub async fn resolve_manifest(
        &self,
        artifact: &ArtifactConfig,
        version: &str,
    ) -> Result<PackageManifest, ModuleError> {
        let url = artifact.registry_document_url(version);
        let bytes = self.fetch(&url).await?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ModuleError::fetch(&url, format!("registry document is not UTF-8: {e}")))?;

        let manifest = PackageManifest::from_registry_document(text)
            .map_err(|e| ModuleError::fetch(&url, format!("invalid registry document: {e}")))?;

        info!(
            requested = version,
            version = %manifest.version,
            tarball = %manifest.tarball,
            "Registry manifest resolved"
        );
        Ok(manifest)
    }

    async fn fetch_http(&self, url: &Url) -> Result<Vec<u8>, ModuleError> {
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                ModuleError::fetch(url.as_str(), "timed out")
            } else if e.is_connect() {
                ModuleError::fetch(url.as_str(), format!("connection failed: {e}"))
            } else {
                ModuleError::fetch(url.as_str(), e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Fetch rejected");
            return Err(ModuleError::fetch(url.as_str(), format!("HTTP status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ModuleError::fetch(url.as_str(), format!("body read failed: {e}")))?;

        Ok(body.to_vec())
    }

    async fn fetch_file(url: &Url) -> Result<Vec<u8>, ModuleError> {
        let path = url
            .to_file_path()
            .map_err(|()| ModuleError::fetch(url.as_str(), "not a local path"))?;

        tokio::fs::read(&path)
            .await
            .map_err(|e| ModuleError::fetch(url.as_str(), e.to_string()))
    }
}

#[async_trait]
impl ModuleFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ModuleError> {
        let parsed = Url::parse(url).map_err(|e| ModuleError::fetch(url, format!("invalid URL: {e}")))?;

        debug!(url, "Fetching module bytes");
        let bytes = match parsed.scheme() {
            "http" | "https" => self.fetch_http(&parsed).await?,
            "file" => Self::fetch_file(&parsed).await?,
            other => {
                return Err(ModuleError::fetch(url, format!("unsupported scheme '{other}'")));
            }
        };

        info!(url, bytes = bytes.len(), "Fetched");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsgo.wasm");
        std::fs::write(&path, b"\0asm\x01\0\0\0").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let bytes = fetcher.fetch(url.as_str()).await.unwrap();
        assert_eq!(bytes, b"\0asm\x01\0\0\0");
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("absent.wasm")).unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(url.as_str()).await.unwrap_err();
        assert!(matches!(err, ModuleError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_urls() {
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher.fetch("ftp://example.com/tsgo.wasm").await.unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[tokio::test]
    async fn test_resolve_manifest_from_local_registry() {
        let dir = tempfile::tempdir().unwrap();
        let package_dir = dir.path().join("tsgo-wasm");
        std::fs::create_dir_all(&package_dir).unwrap();
        std::fs::write(
            package_dir.join("2025.3.14"),
            r#"{"version":"2025.3.14","dist":{"tarball":"file:///tmp/tsgo.tgz"}}"#,
        )
        .unwrap();

        let artifact = ArtifactConfig {
            registry_url: Url::from_directory_path(dir.path()).unwrap().to_string(),
            ..Default::default()
        };

        let fetcher = HttpFetcher::new().unwrap();
        let manifest = fetcher.resolve_manifest(&artifact, "2025.3.14").await.unwrap();
        assert_eq!(manifest.version, "2025.3.14");
        assert_eq!(manifest.tarball, "file:///tmp/tsgo.tgz");
    }

    #[tokio::test]
    async fn test_resolve_manifest_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tsgo-wasm")).unwrap();
        std::fs::write(dir.path().join("tsgo-wasm/latest"), "<html>").unwrap();

        let artifact = ArtifactConfig {
            registry_url: Url::from_directory_path(dir.path()).unwrap().to_string(),
            ..Default::default()
        };

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.resolve_manifest(&artifact, "latest").await.unwrap_err();
        assert!(err.to_string().contains("invalid registry document"));
    }
}
