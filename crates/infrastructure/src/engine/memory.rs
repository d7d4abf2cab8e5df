//! In-process engine over an in-memory piece store.
//!
//! Pieces arrive through [`MemoryTorrent::store_piece`] instead of from a
//! swarm, so the full read path (priorities, blocking reads, shutdown) can be
//! driven deterministically. Peers are simulated with
//! [`MemoryTorrent::connect_peer`] so connection policy is observable too.

use crate::engine::piece_book::PieceBook;
use crate::metainfo;
use async_trait::async_trait;
use domain::{
    Blocklist, DomainError, EngineConfig, EngineTorrent, MagnetLink, PiecePriority, PieceReader,
    PieceState, Torrent, TorrentEngine,
};
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerTransport {
    Tcp,
    Utp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRejection {
    Blocklisted,
    TransportDisabled,
    TooManyConnections,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerConnection {
    pub addr: SocketAddr,
    pub transport: PeerTransport,
}

/// State shared by an engine and every torrent it owns.
struct EngineShared {
    config: EngineConfig,
    blocklist: RwLock<Option<Arc<Blocklist>>>,
    closed: AtomicBool,
}

impl EngineShared {
    fn is_blocked(&self, addr: &SocketAddr) -> bool {
        self.blocklist
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|list| list.contains(addr.ip()))
    }
}

pub struct MemoryEngine {
    shared: Arc<EngineShared>,
    listener: Mutex<Option<TcpListener>>,
    local_port: u16,
    torrents: Mutex<Vec<MemoryTorrent>>,
}

impl MemoryEngine {
    /// Binds the peer listen port and prepares the scratch directory.
    pub async fn start(config: EngineConfig) -> Result<Arc<Self>, DomainError> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| {
                DomainError::EngineInit(format!(
                    "cannot create data directory {}: {e}",
                    config.data_dir.display()
                ))
            })?;

        let listener = TcpListener::bind(("0.0.0.0", config.listen_port))
            .await
            .map_err(|e| {
                DomainError::EngineInit(format!(
                    "cannot listen for peers on port {}: {e}",
                    config.listen_port
                ))
            })?;
        let local_port = listener.local_addr()?.port();

        info!(
            "🔌 Engine listening for peers on port {} (upload {}, tcp {})",
            local_port,
            if config.upload_enabled { "on" } else { "off" },
            if config.allow_tcp { "on" } else { "off" },
        );

        Ok(Arc::new(Self {
            shared: Arc::new(EngineShared {
                config,
                blocklist: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
            listener: Mutex::new(Some(listener)),
            local_port,
            torrents: Mutex::new(Vec::new()),
        }))
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn torrent(&self, info_hash: &str) -> Option<MemoryTorrent> {
        lock(&self.torrents)
            .iter()
            .find(|t| t.inner.info_hash == info_hash)
            .cloned()
    }

    fn register(&self, torrent: MemoryTorrent) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        if self.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        let mut torrents = lock(&self.torrents);
        if let Some(existing) = torrents
            .iter()
            .find(|t| t.inner.info_hash == torrent.inner.info_hash)
        {
            return Ok(Arc::new(existing.clone()));
        }
        torrents.push(torrent.clone());
        Ok(Arc::new(torrent))
    }
}

#[async_trait]
impl TorrentEngine for MemoryEngine {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        debug!(info_hash = %magnet.info_hash, trackers = magnet.trackers.len(), "adding magnet");
        self.register(MemoryTorrent::new(
            magnet.info_hash.clone(),
            self.shared.clone(),
        ))
    }

    async fn add_descriptor(&self, path: &Path) -> Result<Arc<dyn EngineTorrent>, DomainError> {
        let parsed = metainfo::read_descriptor(path).await?;
        let torrent = MemoryTorrent::new(parsed.torrent.info_hash.clone(), self.shared.clone());
        torrent.resolve_with_hashes(parsed.torrent, parsed.piece_hashes)?;
        self.register(torrent)
    }

    fn apply_blocklist(&self, blocklist: Arc<Blocklist>) {
        *self
            .shared
            .blocklist
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(blocklist);
    }

    fn has_blocklist(&self) -> bool {
        self.shared
            .blocklist
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let torrents: Vec<MemoryTorrent> = lock(&self.torrents).drain(..).collect();
        for torrent in torrents {
            torrent.drop_torrent().await;
        }
        lock(&self.listener).take();
        info!("🛑 Engine closed");
    }
}

struct TorrentState {
    metadata: Option<Arc<Torrent>>,
    book: Option<PieceBook>,
    data: Vec<Option<Vec<u8>>>,
    piece_hashes: Vec<[u8; 20]>,
    peers: Vec<PeerConnection>,
    max_connections: usize,
}

struct TorrentInner {
    info_hash: String,
    shared: Arc<EngineShared>,
    state: Mutex<TorrentState>,
    // Bumped on every change a blocked reader might be waiting for.
    changes: watch::Sender<u64>,
    closed: AtomicBool,
    uploaded: AtomicU64,
    next_reader: AtomicU64,
}

impl TorrentInner {
    fn state(&self) -> MutexGuard<'_, TorrentState> {
        lock(&self.state)
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.shared.closed.load(Ordering::Acquire)
    }
}

/// A torrent owned by a [`MemoryEngine`]. Cloning yields another handle to
/// the same torrent.
#[derive(Clone)]
pub struct MemoryTorrent {
    inner: Arc<TorrentInner>,
}

impl MemoryTorrent {
    fn new(info_hash: String, shared: Arc<EngineShared>) -> Self {
        let max_connections = shared.config.max_connections;
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(TorrentInner {
                info_hash,
                shared,
                state: Mutex::new(TorrentState {
                    metadata: None,
                    book: None,
                    data: Vec::new(),
                    piece_hashes: Vec::new(),
                    peers: Vec::new(),
                    max_connections,
                }),
                changes,
                closed: AtomicBool::new(false),
                uploaded: AtomicU64::new(0),
                next_reader: AtomicU64::new(1),
            }),
        }
    }

    /// Supplies metadata for a torrent added by magnet, as if fetched from peers.
    pub fn resolve(&self, torrent: Torrent) -> Result<(), DomainError> {
        self.resolve_with_hashes(torrent, Vec::new())
    }

    /// Like [`resolve`](Self::resolve), also verifying stored pieces against
    /// `piece_hashes` when it is not empty.
    pub fn resolve_with_hashes(
        &self,
        torrent: Torrent,
        piece_hashes: Vec<[u8; 20]>,
    ) -> Result<(), DomainError> {
        if torrent.info_hash != self.inner.info_hash {
            return Err(DomainError::TorrentAdd(format!(
                "metadata for {} does not match torrent {}",
                torrent.info_hash, self.inner.info_hash
            )));
        }
        if !piece_hashes.is_empty() && piece_hashes.len() != torrent.piece_count() {
            return Err(DomainError::TorrentAdd(format!(
                "torrent has {} pieces but {} piece hashes",
                torrent.piece_count(),
                piece_hashes.len()
            )));
        }

        {
            let mut state = self.inner.state();
            if state.metadata.is_some() {
                return Ok(());
            }
            state.book = Some(PieceBook::new(&torrent));
            state.data = vec![None; torrent.piece_count()];
            state.piece_hashes = piece_hashes;
            state.metadata = Some(Arc::new(torrent));
        }
        self.inner.notify();
        Ok(())
    }

    /// Stores a downloaded piece, verifying its length and hash.
    pub fn store_piece(&self, index: usize, data: Vec<u8>) -> Result<(), DomainError> {
        if self.inner.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        {
            let mut state = self.inner.state();
            let book = state.book.as_ref().ok_or(DomainError::MetadataUnresolved)?;
            if index >= book.piece_count() {
                return Err(DomainError::InvalidPiece {
                    index,
                    reason: format!("torrent has {} pieces", book.piece_count()),
                });
            }
            let expected = book.piece_len(index);
            if data.len() as u64 != expected {
                return Err(DomainError::InvalidPiece {
                    index,
                    reason: format!("expected {expected} bytes, got {}", data.len()),
                });
            }
            if let Some(hash) = state.piece_hashes.get(index) {
                let computed: [u8; 20] = Sha1::digest(&data).into();
                if &computed != hash {
                    return Err(DomainError::InvalidPiece {
                        index,
                        reason: format!(
                            "hash mismatch: expected {}, got {}",
                            hex::encode(hash),
                            hex::encode(computed)
                        ),
                    });
                }
            }

            state.data[index] = Some(data);
            if let Some(book) = state.book.as_mut() {
                book.mark_complete(index);
            }
        }
        debug!(info_hash = %self.inner.info_hash, index, "piece stored");
        self.inner.notify();
        Ok(())
    }

    /// Admits a peer connection unless policy forbids it.
    pub fn connect_peer(
        &self,
        addr: SocketAddr,
        transport: PeerTransport,
    ) -> Result<(), PeerRejection> {
        if self.inner.is_closed() {
            return Err(PeerRejection::Closed);
        }
        if transport == PeerTransport::Tcp && !self.inner.shared.config.allow_tcp {
            return Err(PeerRejection::TransportDisabled);
        }
        if self.inner.shared.is_blocked(&addr) {
            debug!(%addr, "refusing blocklisted peer");
            return Err(PeerRejection::Blocklisted);
        }
        let mut state = self.inner.state();
        if state.peers.len() >= state.max_connections {
            return Err(PeerRejection::TooManyConnections);
        }
        if !state.peers.iter().any(|p| p.addr == addr) {
            state.peers.push(PeerConnection { addr, transport });
        }
        Ok(())
    }

    pub fn disconnect_peer(&self, addr: SocketAddr) {
        self.inner.state().peers.retain(|p| p.addr != addr);
    }

    pub fn peers(&self) -> Vec<PeerConnection> {
        self.inner.state().peers.clone()
    }

    /// Hands a completed piece to a peer. `None` when uploading is disabled or
    /// the piece is not available.
    pub fn serve_piece(&self, index: usize) -> Option<Vec<u8>> {
        if !self.inner.shared.config.upload_enabled || self.inner.is_closed() {
            return None;
        }
        let data = self.inner.state().data.get(index)?.clone()?;
        self.inner
            .uploaded
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Some(data)
    }

    pub fn max_connections(&self) -> usize {
        self.inner.state().max_connections
    }

    pub fn open_readers(&self) -> usize {
        self.inner
            .state()
            .book
            .as_ref()
            .map(PieceBook::open_windows)
            .unwrap_or(0)
    }

    /// Read-ahead of every open reader, in no particular order.
    pub fn reader_readaheads(&self) -> Vec<u64> {
        self.inner
            .state()
            .book
            .as_ref()
            .map(PieceBook::readaheads)
            .unwrap_or_default()
    }

    pub fn piece_states(&self) -> Vec<PieceState> {
        self.inner
            .state()
            .book
            .as_ref()
            .map(PieceBook::states)
            .unwrap_or_default()
    }
}

#[async_trait]
impl EngineTorrent for MemoryTorrent {
    fn info_hash(&self) -> String {
        self.inner.info_hash.clone()
    }

    fn metadata(&self) -> Option<Arc<Torrent>> {
        self.inner.state().metadata.clone()
    }

    async fn wait_for_metadata(&self) -> Result<Arc<Torrent>, DomainError> {
        let mut changes = self.inner.changes.subscribe();
        loop {
            if self.inner.is_closed() {
                return Err(DomainError::EngineClosed);
            }
            if let Some(metadata) = self.metadata() {
                return Ok(metadata);
            }
            changes
                .changed()
                .await
                .map_err(|_| DomainError::EngineClosed)?;
        }
    }

    fn set_max_connections(&self, max: usize) {
        let mut state = self.inner.state();
        state.max_connections = max;
        if state.peers.len() > max {
            warn!(
                "dropping {} peers over the new connection limit",
                state.peers.len() - max
            );
            state.peers.truncate(max);
        }
    }

    fn download_all(&self) -> Result<(), DomainError> {
        let mut state = self.inner.state();
        let book = state.book.as_mut().ok_or(DomainError::MetadataUnresolved)?;
        book.download_all();
        Ok(())
    }

    fn set_piece_priority(&self, index: usize, priority: PiecePriority) -> Result<(), DomainError> {
        let mut state = self.inner.state();
        let book = state.book.as_mut().ok_or(DomainError::MetadataUnresolved)?;
        if book.set_priority(index, priority) {
            Ok(())
        } else {
            Err(DomainError::InvalidPiece {
                index,
                reason: format!("torrent has {} pieces", book.piece_count()),
            })
        }
    }

    fn piece_priority(&self, index: usize) -> Option<PiecePriority> {
        self.inner.state().book.as_ref()?.priority(index)
    }

    fn bytes_completed(&self) -> u64 {
        self.inner
            .state()
            .book
            .as_ref()
            .map(PieceBook::bytes_completed)
            .unwrap_or(0)
    }

    fn file_bytes_completed(&self, file_index: usize) -> u64 {
        let state = self.inner.state();
        let (Some(metadata), Some(book)) = (state.metadata.as_ref(), state.book.as_ref()) else {
            return 0;
        };
        metadata
            .file(file_index)
            .map(|file| book.bytes_completed_in(file.offset, file.end_offset()))
            .unwrap_or(0)
    }

    fn bytes_uploaded(&self) -> u64 {
        self.inner.uploaded.load(Ordering::Relaxed)
    }

    fn active_peers(&self) -> usize {
        self.inner.state().peers.len()
    }

    fn new_reader(&self) -> Result<Box<dyn PieceReader>, DomainError> {
        if self.inner.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        let id = self.inner.next_reader.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.inner.state();
            let book = state.book.as_mut().ok_or(DomainError::MetadataUnresolved)?;
            book.open_window(id);
        }
        Ok(Box::new(MemoryReader {
            torrent: self.inner.clone(),
            id,
            position: 0,
            closed: false,
        }))
    }

    async fn drop_torrent(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.state().peers.clear();
        self.inner.notify();
        debug!(info_hash = %self.inner.info_hash, "torrent dropped");
    }
}

struct MemoryReader {
    torrent: Arc<TorrentInner>,
    id: u64,
    position: u64,
    closed: bool,
}

impl MemoryReader {
    /// Copies available bytes at the cursor, `None` if the piece is missing.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, DomainError> {
        let mut state = self.torrent.state();
        let metadata = state
            .metadata
            .clone()
            .ok_or(DomainError::MetadataUnresolved)?;
        if self.position >= metadata.total_size {
            return Ok(Some(0));
        }

        let index = (self.position / metadata.piece_length) as usize;
        let Some(piece) = state.data.get(index).and_then(Option::as_ref) else {
            return Ok(None);
        };
        let piece_start = index as u64 * metadata.piece_length;
        let within = (self.position - piece_start) as usize;
        let n = buf.len().min(piece.len() - within);
        buf[..n].copy_from_slice(&piece[within..within + n]);

        self.position += n as u64;
        if let Some(book) = state.book.as_mut() {
            book.move_window(self.id, self.position);
        }
        Ok(Some(n))
    }

    fn with_book(&self, f: impl FnOnce(&mut PieceBook)) {
        if let Some(book) = self.torrent.state().book.as_mut() {
            f(book);
        }
    }
}

#[async_trait]
impl PieceReader for MemoryReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DomainError> {
        if self.closed {
            return Err(DomainError::ReaderClosed);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let mut changes = self.torrent.changes.subscribe();
        loop {
            if self.torrent.is_closed() {
                return Err(DomainError::EngineClosed);
            }
            if let Some(n) = self.try_read(buf)? {
                return Ok(n);
            }
            changes
                .changed()
                .await
                .map_err(|_| DomainError::EngineClosed)?;
        }
    }

    async fn seek(&mut self, offset: u64) -> Result<u64, DomainError> {
        if self.closed {
            return Err(DomainError::ReaderClosed);
        }
        if self.torrent.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        let total = self
            .torrent
            .state()
            .metadata
            .as_ref()
            .map(|m| m.total_size)
            .ok_or(DomainError::MetadataUnresolved)?;
        if offset > total {
            return Err(DomainError::SeekOutOfRange {
                requested: offset as i128,
                length: total,
            });
        }
        self.position = offset;
        let id = self.id;
        self.with_book(|book| book.move_window(id, offset));
        Ok(offset)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn set_readahead(&mut self, bytes: u64) {
        let id = self.id;
        self.with_book(|book| book.set_window_readahead(id, bytes));
    }

    fn set_responsive(&mut self) {
        let id = self.id;
        self.with_book(|book| book.set_window_responsive(id));
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let id = self.id;
        self.with_book(|book| book.close_window(id));
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
