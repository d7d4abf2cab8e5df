//! Swarm engine backed by librqbit.
//!
//! librqbit schedules pieces from the positions of its open file streams.
//! Urgent pieces are therefore driven by holding a stream at the start of the
//! file they belong to, and reads go through `ManagedTorrent::stream`. Piece
//! priorities are mirrored in a [`PieceBook`]. Settings librqbit has no runtime
//! knob for, such as per-torrent connection limits, are only logged.

use crate::engine::close_signal::{CloseSignal, ClosedWatch};
use crate::engine::piece_book::PieceBook;
use async_trait::async_trait;
use domain::{
    Blocklist, DomainError, EngineConfig, EngineTorrent, MagnetLink, PiecePriority, PieceReader,
    Torrent, TorrentEngine,
};
use librqbit::{AddTorrent, AddTorrentOptions, ManagedTorrent, Session, SessionOptions};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

// librqbit does not export these from its crate root; `ManagedTorrent::stream`
// returns its `FileStream`, which is boxed here so it can be named.
type ManagedTorrentHandle = Arc<ManagedTorrent>;
type FileStream = Box<dyn FileStreamIo>;

trait FileStreamIo: AsyncRead + AsyncSeek + Send + Unpin {}
impl<T: AsyncRead + AsyncSeek + Send + Unpin> FileStreamIo for T {}
use tracing::{debug, info, warn};

pub struct RqbitEngine {
    session: Arc<Session>,
    config: EngineConfig,
    filtering: bool,
    closed: Arc<CloseSignal>,
}

fn session_options(config: &EngineConfig, blocklist_url: Option<String>) -> SessionOptions {
    let port = config.listen_port;
    SessionOptions {
        disable_dht: false,
        disable_dht_persistence: true,
        listen_port_range: Some(port..port.saturating_add(1)),
        blocklist_url,
        disable_upload: !config.upload_enabled,
        ..Default::default()
    }
}

impl RqbitEngine {
    pub async fn start(config: &EngineConfig) -> Result<Self, DomainError> {
        if !config.allow_tcp {
            return Err(DomainError::EngineInit(
                "the rqbit engine reaches peers over TCP only; disabling TCP leaves no transport"
                    .to_string(),
            ));
        }

        let data_dir = config.data_dir.clone();
        let (session, filtering) = match Session::new_with_opts(
            data_dir.clone(),
            session_options(config, config.blocklist_url.clone()),
        )
        .await
        {
            Ok(session) => (session, config.blocklist_url.is_some()),
            Err(e) if config.blocklist_url.is_some() => {
                warn!("⚠️  Continuing without blocklist: {e:#}");
                let session = Session::new_with_opts(data_dir, session_options(config, None))
                    .await
                    .map_err(|e| DomainError::EngineInit(format!("{e:#}")))?;
                (session, false)
            }
            Err(e) => return Err(DomainError::EngineInit(format!("{e:#}"))),
        };

        info!(
            upload = config.upload_enabled,
            blocklist = filtering,
            "🔌 rqbit session started in {}",
            config.data_dir.display()
        );

        Ok(Self {
            session,
            config: config.clone(),
            filtering,
            closed: Arc::new(CloseSignal::new()),
        })
    }

    async fn add(&self, add: AddTorrent<'_>) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        if self.closed.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        let opts = AddTorrentOptions {
            overwrite: true,
            output_folder: Some(self.config.data_dir.to_string_lossy().to_string()),
            ..Default::default()
        };
        let handle = self
            .session
            .add_torrent(add, Some(opts))
            .await
            .map_err(|e| DomainError::TorrentAdd(format!("{e:#}")))?
            .into_handle()
            .ok_or_else(|| DomainError::TorrentAdd("torrent was only listed".to_string()))?;

        Ok(Arc::new(RqbitTorrent::new(
            handle,
            self.session.clone(),
            self.closed.clone(),
        )))
    }
}

#[async_trait]
impl TorrentEngine for RqbitEngine {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        self.add(AddTorrent::from_url(magnet.uri.as_str())).await
    }

    async fn add_descriptor(&self, path: &Path) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        let add = AddTorrent::from_local_filename(&path.to_string_lossy())
            .map_err(|e| DomainError::TorrentAdd(format!("{e:#}")))?;
        self.add(add).await
    }

    fn apply_blocklist(&self, blocklist: Arc<Blocklist>) {
        // librqbit only takes a blocklist when the session is built.
        warn!(
            ranges = blocklist.num_ranges(),
            "rqbit cannot filter peers after startup; blocklist ignored"
        );
    }

    fn has_blocklist(&self) -> bool {
        self.filtering
    }

    async fn close(&self) {
        if !self.closed.close() {
            return;
        }
        self.session.stop().await;
        info!("🛑 rqbit session stopped");
    }
}

struct RqbitTorrent {
    handle: ManagedTorrentHandle,
    session: Arc<Session>,
    metadata: OnceLock<Arc<Torrent>>,
    book: Mutex<Option<PieceBook>>,
    /// Streams held open at the start of files with urgent pieces.
    anchors: Mutex<HashMap<usize, FileStream>>,
    next_reader: AtomicU64,
    closed: CloseSignal,
    engine_closed: Arc<CloseSignal>,
}

impl RqbitTorrent {
    fn new(handle: ManagedTorrentHandle, session: Arc<Session>, engine_closed: Arc<CloseSignal>) -> Self {
        Self {
            handle,
            session,
            metadata: OnceLock::new(),
            book: Mutex::new(None),
            anchors: Mutex::new(HashMap::new()),
            next_reader: AtomicU64::new(1),
            closed: CloseSignal::new(),
            engine_closed,
        }
    }

    fn book(&self) -> MutexGuard<'_, Option<PieceBook>> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn anchors(&self) -> MutexGuard<'_, HashMap<usize, FileStream>> {
        self.anchors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch(&self) -> ClosedWatch {
        ClosedWatch::new(&self.closed, &self.engine_closed)
    }

    fn load_metadata(&self) -> Option<Arc<Torrent>> {
        if let Some(metadata) = self.metadata.get() {
            return Some(metadata.clone());
        }
        let info_hash = self.handle.info_hash().as_string();
        let name = self.handle.name().unwrap_or_else(|| info_hash.clone());
        let (piece_length, entries) = self
            .handle
            .with_metadata(|m| {
                let entries: Vec<(String, u64)> = m
                    .file_infos
                    .iter()
                    .map(|f| (f.relative_filename.to_string_lossy().replace('\\', "/"), f.len))
                    .collect();
                (m.info.piece_length as u64, entries)
            })
            .ok()?;
        let torrent = Torrent::new(info_hash, name, piece_length, entries).ok()?;

        *self.book() = Some(PieceBook::new(&torrent));
        Some(self.metadata.get_or_init(|| Arc::new(torrent)).clone())
    }

    /// Keeps a stream open at the start of the file holding `index`, so
    /// librqbit fetches that region first.
    fn anchor(&self, metadata: &Torrent, index: usize) -> Result<(), DomainError> {
        let Some(file) = metadata.file_for_piece(index) else {
            return Ok(());
        };
        let mut anchors = self.anchors();
        if anchors.contains_key(&file.index) {
            return Ok(());
        }
        let stream = self
            .handle
            .clone()
            .stream(file.index)
            .map(|s| Box::new(s) as FileStream)
            .map_err(|e| DomainError::ReaderInit(format!("{e:#}")))?;
        debug!(file = %file.path, "holding stream at file start for urgent pieces");
        anchors.insert(file.index, stream);
        Ok(())
    }
}

#[async_trait]
impl EngineTorrent for RqbitTorrent {
    fn info_hash(&self) -> String {
        self.handle.info_hash().as_string()
    }

    fn metadata(&self) -> Option<Arc<Torrent>> {
        self.load_metadata()
    }

    async fn wait_for_metadata(&self) -> Result<Arc<Torrent>, DomainError> {
        self.watch()
            .guard(async {
                self.handle
                    .wait_until_initialized()
                    .await
                    .map_err(|e| DomainError::TorrentAdd(format!("{e:#}")))?;
                self.load_metadata().ok_or(DomainError::MetadataUnresolved)
            })
            .await
    }

    fn set_max_connections(&self, max: usize) {
        warn!(max, "rqbit sizes its own peer pool; connection limit not applied");
    }

    /// librqbit selects every file when a torrent is added, so this only
    /// records the baseline.
    fn download_all(&self) -> Result<(), DomainError> {
        let mut book = self.book();
        book.as_mut()
            .ok_or(DomainError::MetadataUnresolved)?
            .download_all();
        Ok(())
    }

    fn set_piece_priority(&self, index: usize, priority: PiecePriority) -> Result<(), DomainError> {
        let metadata = self.load_metadata().ok_or(DomainError::MetadataUnresolved)?;
        if priority == PiecePriority::None {
            return Err(DomainError::InvalidPiece {
                index,
                reason: "rqbit cannot skip single pieces of a selected file".to_string(),
            });
        }

        {
            let mut book = self.book();
            let book = book.as_mut().ok_or(DomainError::MetadataUnresolved)?;
            if !book.set_priority(index, priority) {
                return Err(DomainError::InvalidPiece {
                    index,
                    reason: format!("torrent has {} pieces", book.piece_count()),
                });
            }
        }

        if priority == PiecePriority::Urgent {
            self.anchor(&metadata, index)?;
        }
        Ok(())
    }

    fn piece_priority(&self, index: usize) -> Option<PiecePriority> {
        self.book().as_ref()?.priority(index)
    }

    fn bytes_completed(&self) -> u64 {
        self.handle.stats().progress_bytes
    }

    fn file_bytes_completed(&self, file_index: usize) -> u64 {
        self.handle
            .stats()
            .file_progress
            .get(file_index)
            .copied()
            .unwrap_or(0)
    }

    fn bytes_uploaded(&self) -> u64 {
        self.handle.stats().uploaded_bytes
    }

    fn active_peers(&self) -> usize {
        self.handle
            .stats()
            .live
            .map(|live| live.snapshot.peer_stats.live)
            .unwrap_or(0)
    }

    fn new_reader(&self) -> Result<Box<dyn PieceReader>, DomainError> {
        let watch = self.watch();
        if watch.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        let metadata = self.load_metadata().ok_or(DomainError::MetadataUnresolved)?;
        Ok(Box::new(RqbitReader {
            handle: self.handle.clone(),
            metadata,
            watch,
            id: self.next_reader.fetch_add(1, Ordering::Relaxed),
            position: 0,
            current: None,
            closed: false,
        }))
    }

    async fn drop_torrent(&self) {
        if !self.closed.close() {
            return;
        }
        self.anchors().clear();
        if let Err(e) = self.session.delete(self.handle.id().into(), false).await {
            warn!("failed to drop torrent: {e:#}");
        }
    }
}

/// Reader over the flat content space, switching file streams at boundaries.
struct RqbitReader {
    handle: ManagedTorrentHandle,
    metadata: Arc<Torrent>,
    watch: ClosedWatch,
    id: u64,
    position: u64,
    current: Option<(usize, FileStream)>,
    closed: bool,
}

impl RqbitReader {
    async fn stream_at(&mut self, position: u64) -> Result<Option<&mut FileStream>, DomainError> {
        let Some((file_index, within)) = self
            .metadata
            .locate(position)
            .map(|(file, within)| (file.index, within))
        else {
            return Ok(None);
        };

        let reuse = matches!(&self.current, Some((index, _)) if *index == file_index);
        if !reuse {
            let stream = self
                .handle
                .clone()
                .stream(file_index)
                .map(|s| Box::new(s) as FileStream)
                .map_err(|e| DomainError::ReaderInit(format!("{e:#}")))?;
            self.current = Some((file_index, stream));
        }

        let Some((_, stream)) = self.current.as_mut() else {
            return Ok(None);
        };
        stream.seek(SeekFrom::Start(within)).await?;
        Ok(Some(stream))
    }

    async fn read_at_cursor(&mut self, buf: &mut [u8]) -> Result<usize, DomainError> {
        let position = self.position;
        let Some(stream) = self.stream_at(position).await? else {
            return Ok(0);
        };
        let n = stream.read(buf).await?;
        self.position += n as u64;
        Ok(n)
    }
}

#[async_trait]
impl PieceReader for RqbitReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DomainError> {
        if self.closed {
            return Err(DomainError::ReaderClosed);
        }
        let watch = self.watch.clone();
        watch.guard(self.read_at_cursor(buf)).await
    }

    async fn seek(&mut self, offset: u64) -> Result<u64, DomainError> {
        if self.closed {
            return Err(DomainError::ReaderClosed);
        }
        if self.watch.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        if offset > self.metadata.total_size {
            return Err(DomainError::SeekOutOfRange {
                requested: offset as i128,
                length: self.metadata.total_size,
            });
        }
        self.position = offset;
        Ok(offset)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_readahead(&mut self, bytes: u64) {
        debug!(reader = self.id, bytes, "rqbit manages stream read-ahead itself");
    }

    fn set_responsive(&mut self) {
        debug!(reader = self.id, "rqbit streams always favor the piece under the cursor");
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}
