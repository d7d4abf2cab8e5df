use crate::engine::EngineTorrent;
use std::sync::Arc;

/// Completed share above which playback may start: strictly more than 1/20th (5%).
const READY_DENOMINATOR: u128 = 20;

/// `completed / total > 0.05`, false for an empty total.
pub fn ready_for_playback(completed: u64, total: u64) -> bool {
    total > 0 && completed as u128 * READY_DENOMINATOR > total as u128
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessScope {
    Torrent,
    File(usize),
}

/// Polls download completion to decide when a player can safely start.
pub struct ReadinessGate {
    torrent: Arc<dyn EngineTorrent>,
    scope: ReadinessScope,
}

impl ReadinessGate {
    pub fn new(torrent: Arc<dyn EngineTorrent>, scope: ReadinessScope) -> Self {
        Self { torrent, scope }
    }

    pub fn ready_for_playback(&self) -> bool {
        let Some(metadata) = self.torrent.metadata() else {
            return false;
        };
        match self.scope {
            ReadinessScope::Torrent => {
                ready_for_playback(self.torrent.bytes_completed(), metadata.total_size)
            }
            ReadinessScope::File(index) => match metadata.file(index) {
                Some(file) => {
                    ready_for_playback(self.torrent.file_bytes_completed(index), file.length)
                }
                None => false,
            },
        }
    }
}
