use domain::{PiecePriority, PieceState, Torrent};
use std::collections::HashMap;
use std::ops::Range;

/// Read-ahead window of one open reader, in absolute content bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReaderWindow {
    position: u64,
    readahead: u64,
    responsive: bool,
}

/// Piece completion and priorities of one torrent.
///
/// Base priorities come from explicit requests; open readers overlay their
/// read-ahead windows on top. The effective priority of a piece is the
/// highest of the two.
#[derive(Debug, Clone)]
pub struct PieceBook {
    piece_length: u64,
    total_size: u64,
    base: Vec<PiecePriority>,
    complete: Vec<bool>,
    windows: HashMap<u64, ReaderWindow>,
}

impl PieceBook {
    pub fn new(torrent: &Torrent) -> Self {
        let count = torrent.piece_count();
        Self {
            piece_length: torrent.piece_length,
            total_size: torrent.total_size,
            base: vec![PiecePriority::None; count],
            complete: vec![false; count],
            windows: HashMap::new(),
        }
    }

    pub fn piece_count(&self) -> usize {
        self.base.len()
    }

    /// Raises unwanted pieces to `Normal`; higher priorities are kept.
    pub fn download_all(&mut self) {
        for priority in &mut self.base {
            if *priority == PiecePriority::None {
                *priority = PiecePriority::Normal;
            }
        }
    }

    pub fn set_priority(&mut self, index: usize, priority: PiecePriority) -> bool {
        match self.base.get_mut(index) {
            Some(slot) => {
                *slot = priority;
                true
            }
            None => false,
        }
    }

    pub fn priority(&self, index: usize) -> Option<PiecePriority> {
        let base = *self.base.get(index)?;
        let window = self
            .windows
            .values()
            .filter_map(|w| self.window_priority(w, index))
            .max()
            .unwrap_or_default();
        Some(base.max(window))
    }

    fn window_priority(&self, window: &ReaderWindow, index: usize) -> Option<PiecePriority> {
        let pieces = self.window_pieces(window);
        if !pieces.contains(&index) {
            return None;
        }
        if index == pieces.start && window.responsive {
            Some(PiecePriority::Urgent)
        } else {
            Some(PiecePriority::High)
        }
    }

    fn window_pieces(&self, window: &ReaderWindow) -> Range<usize> {
        if window.position >= self.total_size {
            return 0..0;
        }
        let first = (window.position / self.piece_length) as usize;
        let end = window
            .position
            .saturating_add(window.readahead.max(1))
            .min(self.total_size);
        let last = ((end - 1) / self.piece_length) as usize;
        first..last + 1
    }

    pub fn open_window(&mut self, reader_id: u64) {
        self.windows.insert(
            reader_id,
            ReaderWindow {
                position: 0,
                readahead: self.piece_length,
                responsive: false,
            },
        );
    }

    pub fn move_window(&mut self, reader_id: u64, position: u64) {
        if let Some(window) = self.windows.get_mut(&reader_id) {
            window.position = position;
        }
    }

    pub fn set_window_readahead(&mut self, reader_id: u64, readahead: u64) {
        if let Some(window) = self.windows.get_mut(&reader_id) {
            window.readahead = readahead;
        }
    }

    pub fn set_window_responsive(&mut self, reader_id: u64) {
        if let Some(window) = self.windows.get_mut(&reader_id) {
            window.responsive = true;
        }
    }

    pub fn close_window(&mut self, reader_id: u64) {
        self.windows.remove(&reader_id);
    }

    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    pub fn readaheads(&self) -> Vec<u64> {
        self.windows.values().map(|w| w.readahead).collect()
    }

    pub fn mark_complete(&mut self, index: usize) -> bool {
        match self.complete.get_mut(index) {
            Some(done) => {
                *done = true;
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self, index: usize) -> bool {
        self.complete.get(index).copied().unwrap_or(false)
    }

    pub fn piece_len(&self, index: usize) -> u64 {
        let start = index as u64 * self.piece_length;
        (start + self.piece_length).min(self.total_size) - start.min(self.total_size)
    }

    pub fn bytes_completed(&self) -> u64 {
        self.complete
            .iter()
            .enumerate()
            .filter(|(_, done)| **done)
            .map(|(index, _)| self.piece_len(index))
            .sum()
    }

    /// Completed bytes inside `[start, end)`, counting partial piece overlap.
    pub fn bytes_completed_in(&self, start: u64, end: u64) -> u64 {
        let end = end.min(self.total_size);
        if start >= end {
            return 0;
        }
        let first = (start / self.piece_length) as usize;
        let last = ((end - 1) / self.piece_length) as usize;
        (first..=last)
            .filter(|index| self.is_complete(*index))
            .map(|index| {
                let piece_start = index as u64 * self.piece_length;
                let piece_end = (piece_start + self.piece_length).min(self.total_size);
                piece_end.min(end) - piece_start.max(start)
            })
            .sum()
    }

    pub fn states(&self) -> Vec<PieceState> {
        (0..self.piece_count())
            .map(|index| PieceState {
                index,
                priority: self.priority(index).unwrap_or_default(),
                complete: self.is_complete(index),
            })
            .collect()
    }
}
