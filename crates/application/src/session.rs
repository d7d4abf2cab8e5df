use crate::player::open_player;
use config::ClientConfig;
use domain::{DomainError, RemoteFetcher, TorrentClient, TorrentEngine};
use infrastructure::{create_engine, BlocklistLoader, HttpFetcher};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything except RFC 3986 unreserved characters. `/` is escaped too, so a
/// nested path stays a single segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Encodes a file path as one URL path segment.
pub fn encode_path_segment(path: &str) -> String {
    utf8_percent_encode(path, PATH_SEGMENT).to_string()
}

/// How often readiness is polled before launching a player.
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client Session - the engine client, its single torrent and the settings
/// they were built from. Shared by `Arc` between the HTTP layer, the render
/// loop and background tasks.
pub struct ClientSession {
    config: ClientConfig,
    client: TorrentClient,
}

impl ClientSession {
    /// Creates the swarm engine and adds the configured torrent.
    pub async fn start(config: ClientConfig) -> Result<Arc<Self>, DomainError> {
        let engine = create_engine(&config.engine).await?;
        Self::with_engine(config, engine, Arc::new(HttpFetcher::default())).await
    }

    pub async fn with_engine(
        config: ClientConfig,
        engine: Arc<dyn TorrentEngine>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Arc<Self>, DomainError> {
        let client = TorrentClient::new(engine, fetcher);
        if let Err(e) = client
            .add_torrent(&config.torrent, config.engine.max_connections)
            .await
        {
            client.close().await;
            return Err(e);
        }

        Ok(Arc::new(Self { config, client }))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client(&self) -> &TorrentClient {
        &self.client
    }

    /// Waits for metadata and applies streaming priorities in the background.
    /// The caller observes the handle; an error there ends the session.
    pub fn spawn_download(self: &Arc<Self>) -> JoinHandle<Result<Range<usize>, DomainError>> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let urgent = session.client.start_download().await?;
            info!("⬇️  Downloading; urgent pieces {:?}", urgent);
            Ok(urgent)
        })
    }

    /// Loads the configured blocklist in the background and applies it once
    /// available. Failures only log. Nothing is spawned when the engine
    /// already filters peers.
    pub fn spawn_blocklist(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let url = self.config.engine.blocklist_url.clone()?;
        if self.client.has_blocklist() {
            debug!("engine already filters peers; skipping blocklist download");
            return None;
        }
        let session = Arc::clone(self);
        Some(tokio::spawn(async move {
            let loaded = match BlocklistLoader::with_default_cache(&url) {
                Ok(loader) => loader.load().await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(blocklist) if !session.client.is_closed() => {
                    session.client.apply_blocklist(Arc::new(blocklist));
                }
                Ok(_) => {}
                Err(e) => warn!("⚠️  Continuing without blocklist: {}", e),
            }
        }))
    }

    /// Resolves once enough of the torrent is local to start playback.
    pub async fn wait_until_ready(&self, poll: Duration) -> Result<(), DomainError> {
        loop {
            if self.client.is_closed() {
                return Err(DomainError::EngineClosed);
            }
            if self.client.ready_for_playback() {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// URL path of the largest file, as served by the HTTP layer.
    pub fn stream_path(&self) -> Result<String, DomainError> {
        let file = self.client.largest_file()?;
        Ok(format!("/{}", encode_path_segment(&file.path)))
    }

    /// Launches the configured player once playback is ready.
    pub fn spawn_player(self: &Arc<Self>, http_port: u16) -> Option<JoinHandle<()>> {
        let name = self.config.player.clone()?;
        let session = Arc::clone(self);
        Some(tokio::spawn(async move {
            if session.wait_until_ready(READY_POLL_INTERVAL).await.is_err() {
                return;
            }
            match session.stream_path() {
                Ok(path) => open_player(&name, &format!("http://localhost:{http_port}{path}")),
                Err(e) => error!("cannot launch player: {}", e),
            }
        }))
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}
