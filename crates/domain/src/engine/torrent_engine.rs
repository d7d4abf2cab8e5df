use crate::engine::PieceReader;
use crate::entities::{Blocklist, MagnetLink, PiecePriority, Torrent};
use crate::errors::DomainError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// A torrent engine client: owns the swarm connections and the piece store.
///
/// This is a PORT in hexagonal architecture; the wire protocol lives behind it.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Arc<dyn EngineTorrent>, DomainError>;

    /// Adds a torrent from a descriptor file on the local disk.
    async fn add_descriptor(&self, path: &Path) -> Result<Arc<dyn EngineTorrent>, DomainError>;

    /// Filters future peer connections. Connections already open are kept.
    fn apply_blocklist(&self, blocklist: Arc<Blocklist>);

    /// Whether peer filtering is already active, either applied or built in
    /// when the engine started.
    fn has_blocklist(&self) -> bool;

    /// Stops accepting connections and releases every torrent. Pending reads
    /// fail with [`DomainError::EngineClosed`].
    async fn close(&self);
}

/// One torrent attached to an engine.
#[async_trait]
pub trait EngineTorrent: Send + Sync {
    /// Content-addressed identity, available before metadata.
    fn info_hash(&self) -> String;

    /// Resolved metadata, or `None` while it is still being fetched from peers.
    fn metadata(&self) -> Option<Arc<Torrent>>;

    /// Completes once metadata has been resolved.
    async fn wait_for_metadata(&self) -> Result<Arc<Torrent>, DomainError>;

    fn set_max_connections(&self, max: usize);

    /// Marks every piece as wanted at normal priority; higher priorities are kept.
    fn download_all(&self) -> Result<(), DomainError>;

    fn set_piece_priority(&self, index: usize, priority: PiecePriority) -> Result<(), DomainError>;

    /// Effective priority of a piece, including read-ahead windows of open readers.
    fn piece_priority(&self, index: usize) -> Option<PiecePriority>;

    fn bytes_completed(&self) -> u64;

    fn file_bytes_completed(&self, file_index: usize) -> u64;

    fn bytes_uploaded(&self) -> u64;

    fn active_peers(&self) -> usize;

    /// A fresh sequential reader over the whole content space.
    fn new_reader(&self) -> Result<Box<dyn PieceReader>, DomainError>;

    async fn drop_torrent(&self);
}
