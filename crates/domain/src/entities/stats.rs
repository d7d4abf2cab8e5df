use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Best-effort snapshot of the active torrent. Fields may be read at slightly
/// different instants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentStats {
    pub name: Option<String>,
    pub total_length: u64,
    pub bytes_completed: u64,
    pub bytes_uploaded: u64,
    pub active_peers: usize,
}

impl TorrentStats {
    pub fn percentage(&self) -> f64 {
        if self.total_length == 0 {
            return 0.0;
        }
        self.bytes_completed as f64 / self.total_length as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.total_length > 0 && self.bytes_completed >= self.total_length
    }
}

pub const DEFAULT_TORRENT_PORT: u16 = 50007;
pub const DEFAULT_MAX_CONNECTIONS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// When false no pieces are served to peers.
    pub upload_enabled: bool,
    pub allow_tcp: bool,
    /// Inbound peer port, 0 for an ephemeral one.
    pub listen_port: u16,
    pub max_connections: usize,
    /// Scratch directory for piece data; nothing there survives a restart.
    pub data_dir: PathBuf,
    /// Gzipped P2P blocklist source. `None` runs without one.
    pub blocklist_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_enabled: false,
            allow_tcp: true,
            listen_port: DEFAULT_TORRENT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            data_dir: std::env::temp_dir(),
            blocklist_url: None,
        }
    }
}
