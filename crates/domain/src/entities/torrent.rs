use crate::entities::TorrentFile;
use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Resolved torrent metadata. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    pub info_hash: String, // SHA1 hash as hex string
    pub name: String,
    pub total_size: u64,
    pub piece_length: u64,
    pub files: Vec<TorrentFile>,
}

impl Torrent {
    /// Builds the content layout from `(path, length)` entries in torrent order.
    /// File offsets are assigned so the files partition `[0, total_size)`.
    pub fn new(
        info_hash: String,
        name: String,
        piece_length: u64,
        entries: Vec<(String, u64)>,
    ) -> Result<Self, DomainError> {
        if piece_length == 0 {
            return Err(DomainError::TorrentAdd(
                "piece length must be greater than zero".to_string(),
            ));
        }
        if entries.is_empty() {
            return Err(DomainError::TorrentAdd("torrent has no files".to_string()));
        }

        let mut files = Vec::with_capacity(entries.len());
        let mut offset = 0u64;
        for (index, (path, length)) in entries.into_iter().enumerate() {
            files.push(TorrentFile::new(index, path, length, offset));
            offset = offset.checked_add(length).ok_or_else(|| {
                DomainError::TorrentAdd("torrent length overflows".to_string())
            })?;
        }

        Ok(Self {
            info_hash,
            name,
            total_size: offset,
            piece_length,
            files,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.total_size.div_ceil(self.piece_length) as usize
    }

    /// Byte range covered by piece `index`; the last piece may be short.
    pub fn piece_range(&self, index: usize) -> Option<Range<u64>> {
        if index >= self.piece_count() {
            return None;
        }
        let start = index as u64 * self.piece_length;
        let end = (start + self.piece_length).min(self.total_size);
        Some(start..end)
    }

    pub fn piece_at(&self, byte_offset: u64) -> Option<usize> {
        if byte_offset >= self.total_size {
            return None;
        }
        Some((byte_offset / self.piece_length) as usize)
    }

    /// Inclusive-exclusive piece indices overlapping `[start, end)`.
    pub fn pieces_for_bytes(&self, start: u64, end: u64) -> Range<usize> {
        let end = end.min(self.total_size);
        if start >= end {
            return 0..0;
        }
        let first = (start / self.piece_length) as usize;
        let last = ((end - 1) / self.piece_length) as usize;
        first..last + 1
    }

    /// The largest file; the first one wins when several share the maximum length.
    pub fn largest_file(&self) -> Option<&TorrentFile> {
        let mut target: Option<&TorrentFile> = None;
        for file in &self.files {
            match target {
                Some(current) if current.length >= file.length => {}
                _ => target = Some(file),
            }
        }
        target
    }

    /// The file holding content byte `offset` and the offset within it.
    /// Zero-length files hold no bytes and are never returned.
    pub fn locate(&self, offset: u64) -> Option<(&TorrentFile, u64)> {
        self.files
            .iter()
            .find(|f| f.contains_byte(offset))
            .map(|f| (f, offset - f.offset))
    }

    /// The file sharing the most bytes with piece `index`; earlier files win ties.
    pub fn file_for_piece(&self, index: usize) -> Option<&TorrentFile> {
        let piece = self.piece_range(index)?;
        let mut best: Option<(&TorrentFile, u64)> = None;
        for file in &self.files {
            let overlap = piece
                .end
                .min(file.end_offset())
                .saturating_sub(piece.start.max(file.offset));
            if overlap > best.map_or(0, |(_, len)| len) {
                best = Some((file, overlap));
            }
        }
        best.map(|(file, _)| file)
    }

    pub fn file(&self, index: usize) -> Option<&TorrentFile> {
        self.files.get(index)
    }

    /// Looks a file up by its full path or by its bare file name.
    pub fn find_file(&self, name: &str) -> Option<&TorrentFile> {
        let name = name.trim_start_matches('/');
        self.files
            .iter()
            .find(|f| f.path == name)
            .or_else(|| self.files.iter().find(|f| f.file_name() == Some(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(lengths: &[u64]) -> Torrent {
        let entries = lengths
            .iter()
            .enumerate()
            .map(|(i, len)| (format!("dir/file{i}.mkv"), *len))
            .collect();
        Torrent::new("ab".repeat(20), "dir".to_string(), 16, entries).unwrap()
    }

    #[test]
    fn files_partition_the_content_space() {
        let torrent = layout(&[10, 30, 0, 30, 5]);
        assert_eq!(torrent.total_size, 75);

        let mut expected_offset = 0;
        for file in &torrent.files {
            assert_eq!(file.offset, expected_offset);
            assert!(file.offset + file.length <= torrent.total_size);
            expected_offset = file.end_offset();
        }
        assert_eq!(expected_offset, torrent.total_size);
    }

    #[test]
    fn piece_layout_rounds_up_and_shortens_last_piece() {
        let torrent = layout(&[40]);
        assert_eq!(torrent.piece_count(), 3);
        assert_eq!(torrent.piece_range(0), Some(0..16));
        assert_eq!(torrent.piece_range(2), Some(32..40));
        assert_eq!(torrent.piece_range(3), None);
        assert_eq!(torrent.piece_at(39), Some(2));
        assert_eq!(torrent.piece_at(40), None);
    }

    #[test]
    fn largest_file_prefers_first_of_tied_maxima() {
        let torrent = layout(&[10, 30, 30, 5]);
        assert_eq!(torrent.largest_file().map(|f| f.index), Some(1));
    }

    #[test]
    fn pieces_for_bytes_covers_partial_pieces() {
        let torrent = layout(&[100]);
        assert_eq!(torrent.pieces_for_bytes(0, 16), 0..1);
        assert_eq!(torrent.pieces_for_bytes(15, 17), 0..2);
        assert_eq!(torrent.pieces_for_bytes(90, 500), 5..7);
        assert_eq!(torrent.pieces_for_bytes(20, 20), 0..0);
    }

    #[test]
    fn rejects_zero_piece_length() {
        let err = Torrent::new("00".repeat(20), "x".into(), 0, vec![("x".into(), 1)]);
        assert!(matches!(err, Err(DomainError::TorrentAdd(_))));
    }

    #[test]
    fn locate_maps_flat_offsets_into_files() {
        let torrent = layout(&[10, 0, 30, 5]);
        assert_eq!(torrent.locate(0).map(|(f, at)| (f.index, at)), Some((0, 0)));
        assert_eq!(torrent.locate(9).map(|(f, at)| (f.index, at)), Some((0, 9)));
        // The empty file shares offset 10 with the next one and is skipped.
        assert_eq!(torrent.locate(10).map(|(f, at)| (f.index, at)), Some((2, 0)));
        assert_eq!(torrent.locate(39).map(|(f, at)| (f.index, at)), Some((2, 29)));
        assert_eq!(torrent.locate(44).map(|(f, at)| (f.index, at)), Some((3, 4)));
        assert!(torrent.locate(45).is_none());
    }

    #[test]
    fn file_for_piece_takes_the_widest_overlap() {
        // Pieces of 16 bytes over files [0,10) [10,40) [40,45).
        let torrent = layout(&[10, 30, 5]);
        assert_eq!(torrent.file_for_piece(0).map(|f| f.index), Some(0));
        assert_eq!(torrent.file_for_piece(1).map(|f| f.index), Some(1));
        assert_eq!(torrent.file_for_piece(2).map(|f| f.index), Some(1));
        assert!(torrent.file_for_piece(3).is_none());

        let even = layout(&[8, 8]);
        assert_eq!(even.file_for_piece(0).map(|f| f.index), Some(0));
    }

    #[test]
    fn find_file_matches_path_or_name() {
        let torrent = layout(&[1, 2]);
        assert_eq!(torrent.find_file("dir/file1.mkv").map(|f| f.index), Some(1));
        assert_eq!(torrent.find_file("file0.mkv").map(|f| f.index), Some(0));
        assert!(torrent.find_file("missing.mkv").is_none());
    }
}
