use crate::engine::{EngineTorrent, RemoteFetcher, TorrentEngine};
use crate::entities::{Blocklist, Torrent, TorrentFile, TorrentSource, TorrentStats};
use crate::errors::DomainError;
use crate::services::file_reader::FileReader;
use crate::services::readiness::{ReadinessGate, ReadinessScope};
use crate::services::stream_prioritizer::StreamPrioritizer;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Engine adapter: one engine client and the single torrent it streams.
pub struct TorrentClient {
    engine: Arc<dyn TorrentEngine>,
    fetcher: Arc<dyn RemoteFetcher>,
    torrent: OnceLock<Arc<dyn EngineTorrent>>,
    closed: AtomicBool,
}

impl TorrentClient {
    pub fn new(engine: Arc<dyn TorrentEngine>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            engine,
            fetcher,
            torrent: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Attaches the torrent referenced by `reference`: a magnet URI, an HTTP(S)
    /// URL of a descriptor, or a local descriptor path.
    pub async fn add_torrent(
        &self,
        reference: &str,
        max_connections: usize,
    ) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DomainError::EngineClosed);
        }
        if self.torrent.get().is_some() {
            return Err(DomainError::TorrentAdd(
                "a torrent is already active in this client".to_string(),
            ));
        }

        let source = TorrentSource::parse(reference)?;
        info!("📥 Adding torrent from {}", source);

        let torrent = match source {
            TorrentSource::Magnet(magnet) => self.engine.add_magnet(&magnet).await?,
            TorrentSource::Remote(url) => {
                let path = self.fetcher.fetch(&url).await?;
                debug!(path = %path.display(), "downloaded torrent descriptor");
                self.engine.add_descriptor(&path).await?
            }
            TorrentSource::Local(path) => {
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(DomainError::FileNotFound(path.display().to_string()));
                }
                self.engine.add_descriptor(&path).await?
            }
        };

        torrent.set_max_connections(max_connections);

        self.torrent.set(torrent.clone()).map_err(|_| {
            DomainError::TorrentAdd("a torrent is already active in this client".to_string())
        })?;

        Ok(torrent)
    }

    pub fn torrent(&self) -> Result<&Arc<dyn EngineTorrent>, DomainError> {
        self.torrent
            .get()
            .ok_or_else(|| DomainError::NotFound("no torrent has been added".to_string()))
    }

    pub fn metadata(&self) -> Result<Arc<Torrent>, DomainError> {
        self.torrent()?.metadata().ok_or(DomainError::MetadataUnresolved)
    }

    pub async fn wait_for_metadata(&self) -> Result<Arc<Torrent>, DomainError> {
        self.torrent()?.wait_for_metadata().await
    }

    /// Waits for metadata, then wants every piece and makes the start of the
    /// largest file urgent. Returns the urgent piece range.
    pub async fn start_download(&self) -> Result<Range<usize>, DomainError> {
        let torrent = self.torrent()?.clone();
        let metadata = torrent.wait_for_metadata().await?;
        if self.closed.load(Ordering::Acquire) {
            return Err(DomainError::EngineClosed);
        }

        info!(
            "📁 Metadata resolved: {} ({} bytes, {} pieces, {} files)",
            metadata.name,
            metadata.total_size,
            metadata.piece_count(),
            metadata.files.len()
        );

        StreamPrioritizer::prioritize_sequential(torrent.as_ref(), &metadata)
    }

    pub fn largest_file(&self) -> Result<TorrentFile, DomainError> {
        let metadata = self.metadata()?;
        metadata
            .largest_file()
            .cloned()
            .ok_or_else(|| DomainError::NotFound("torrent has no files".to_string()))
    }

    pub fn find_file(&self, name: &str) -> Result<TorrentFile, DomainError> {
        let metadata = self.metadata()?;
        metadata
            .find_file(name)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("no file named {name}")))
    }

    pub async fn open_file(&self, file: &TorrentFile) -> Result<FileReader, DomainError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DomainError::EngineClosed);
        }
        FileReader::open(self.torrent()?.as_ref(), file.clone()).await
    }

    pub fn readiness(&self, scope: ReadinessScope) -> Result<ReadinessGate, DomainError> {
        Ok(ReadinessGate::new(self.torrent()?.clone(), scope))
    }

    pub fn ready_for_playback(&self) -> bool {
        self.readiness(ReadinessScope::Torrent)
            .map(|gate| gate.ready_for_playback())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> TorrentStats {
        let Ok(torrent) = self.torrent() else {
            return TorrentStats::default();
        };
        let metadata = torrent.metadata();
        TorrentStats {
            name: metadata.as_ref().map(|m| m.name.clone()),
            total_length: metadata.as_ref().map(|m| m.total_size).unwrap_or(0),
            bytes_completed: torrent.bytes_completed(),
            bytes_uploaded: torrent.bytes_uploaded(),
            active_peers: torrent.active_peers(),
        }
    }

    pub fn apply_blocklist(&self, blocklist: Arc<Blocklist>) {
        info!("🛡️  Applying blocklist with {} ranges", blocklist.num_ranges());
        self.engine.apply_blocklist(blocklist);
    }

    pub fn has_blocklist(&self) -> bool {
        self.engine.has_blocklist()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drops the torrent and closes the engine. Only the first call has an effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(torrent) = self.torrent.get() {
            torrent.drop_torrent().await;
        }
        self.engine.close().await;
        info!("👋 Torrent client closed");
    }
}
