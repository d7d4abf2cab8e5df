//! Peer blocklist download, cache and decode.

use crate::fetch::HttpFetcher;
use domain::{Blocklist, DomainError};
use flate2::read::GzDecoder;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

pub const BLOCKLIST_CACHE_NAME: &str = "peerflix-blocklist.gz";

pub struct BlocklistLoader {
    url: Url,
    cache_path: PathBuf,
    fetcher: HttpFetcher,
}

impl BlocklistLoader {
    pub fn new(url: &str, cache_path: PathBuf) -> Result<Self, DomainError> {
        let url = Url::parse(url).map_err(|e| DomainError::Blocklist(format!("{url}: {e}")))?;
        Ok(Self {
            url,
            cache_path,
            fetcher: HttpFetcher::default(),
        })
    }

    /// Loader for `url` cached under the OS temp directory.
    pub fn with_default_cache(url: &str) -> Result<Self, DomainError> {
        Self::new(url, std::env::temp_dir().join(BLOCKLIST_CACHE_NAME))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Returns the blocklist, downloading it first unless a cached copy exists.
    pub async fn load(&self) -> Result<Blocklist, DomainError> {
        let cached = tokio::fs::metadata(&self.cache_path)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);

        let blocklist = if cached {
            debug!(path = %self.cache_path.display(), "using cached blocklist");
            load_gzipped(self.cache_path.clone()).await?
        } else {
            self.download().await?
        };
        info!(
            "🛡️  Loaded blocklist: {} ranges ({} lines skipped)",
            blocklist.num_ranges(),
            blocklist.skipped_lines()
        );
        Ok(blocklist)
    }

    /// Fetches and decodes the list. Only a list that decodes replaces the
    /// cache, and it is moved into place in one rename.
    async fn download(&self) -> Result<Blocklist, DomainError> {
        let bytes = self.fetcher.fetch_bytes(&self.url).await?;
        let cache_path = self.cache_path.clone();
        let source = self.url.to_string();

        tokio::task::spawn_blocking(move || {
            let blocklist = decode(bytes.as_slice(), &source)?;
            if let Err(e) = store(&cache_path, &bytes) {
                warn!("cannot cache blocklist at {}: {}", cache_path.display(), e);
            }
            Ok(blocklist)
        })
        .await
        .map_err(|e| DomainError::Blocklist(e.to_string()))?
    }
}

fn store(cache_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = cache_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut staged = tempfile::Builder::new()
        .prefix("peerflix-blocklist-")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.persist(cache_path).map_err(|e| e.error)?;
    Ok(())
}

fn decode(gzipped: impl Read, source: &str) -> Result<Blocklist, DomainError> {
    let mut raw = Vec::new();
    GzDecoder::new(gzipped)
        .read_to_end(&mut raw)
        .map_err(|e| DomainError::Blocklist(format!("{source}: {e}")))?;
    Blocklist::parse_p2p(&String::from_utf8_lossy(&raw))
}

/// Decompresses and parses a gzipped P2P blocklist off the async runtime.
pub async fn load_gzipped(path: PathBuf) -> Result<Blocklist, DomainError> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)
            .map_err(|e| DomainError::Blocklist(format!("{}: {e}", path.display())))?;
        decode(file, &path.display().to_string())
    })
    .await
    .map_err(|e| DomainError::Blocklist(e.to_string()))?
}
