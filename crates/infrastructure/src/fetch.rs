use async_trait::async_trait;
use domain::{DomainError, RemoteFetcher};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use url::Url;

/// Downloads torrent descriptors over HTTP(S) into kept temporary files.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetches `url` and returns the response body.
    pub async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, DomainError> {
        info!("🌐 Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DomainError::fetch(url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(DomainError::fetch(
                url.as_str(),
                format!("HTTP error: {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DomainError::fetch(url.as_str(), e))?;
        info!("📦 Downloaded {} bytes", bytes.len());

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<PathBuf, DomainError> {
        let bytes = self.fetch_bytes(url).await?;

        if !url.path().ends_with(".torrent") && !bytes.starts_with(b"d") {
            warn!("⚠️  {} does not look like a torrent descriptor", url);
        }

        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix("peerflix-")
                .suffix(".torrent")
                .tempfile()?;
            file.write_all(&bytes)?;
            let (_, path) = file.keep().map_err(|e| e.error)?;
            Ok::<_, std::io::Error>(path)
        })
        .await
        .map_err(|e| DomainError::fetch(&url, e))?
        .map_err(|e| DomainError::fetch(&url, e))
    }
}
