use crate::engine::EngineTorrent;
use crate::entities::{PiecePriority, Torrent, TorrentFile};
use crate::errors::DomainError;
use std::ops::Range;
use tracing::debug;

/// Share of the target file's pieces fetched at urgent priority, in percent.
pub const URGENT_PERCENT: u64 = 5;

/// Read-ahead as a share of the file length, in percent.
pub const READAHEAD_PERCENT: u64 = 1;

/// Pieces of `file` that start at urgent priority.
///
/// The file's byte range is first mapped to its piece range, then the first
/// `URGENT_PERCENT` of that range is taken, rounded up, and never less than
/// one piece.
pub fn urgent_piece_range(torrent: &Torrent, file: &TorrentFile) -> Range<usize> {
    let pieces = torrent.pieces_for_bytes(file.offset, file.end_offset());
    let count = pieces.len() as u64;
    if count == 0 {
        return pieces;
    }
    let urgent = (count * URGENT_PERCENT).div_ceil(100).max(1);
    pieces.start..pieces.start + urgent as usize
}

/// Read-ahead window for a reader over `file`, never below one piece.
pub fn readahead_for(file: &TorrentFile, piece_length: u64) -> u64 {
    (file.length * READAHEAD_PERCENT / 100).max(piece_length)
}

/// Applies the initial piece priorities for streaming.
pub struct StreamPrioritizer;

impl StreamPrioritizer {
    /// Wants every piece, then elevates the start of the largest file so
    /// playback can begin quickly. Returns the urgent piece range.
    pub fn prioritize_sequential(
        torrent: &dyn EngineTorrent,
        metadata: &Torrent,
    ) -> Result<Range<usize>, DomainError> {
        torrent.download_all()?;

        let Some(target) = metadata.largest_file() else {
            return Ok(0..0);
        };

        let urgent = urgent_piece_range(metadata, target);
        for piece_index in urgent.clone() {
            torrent.set_piece_priority(piece_index, PiecePriority::Urgent)?;
        }
        debug!(
            file = %target.path,
            pieces = ?urgent,
            "elevated start of largest file to urgent priority"
        );

        Ok(urgent)
    }
}
