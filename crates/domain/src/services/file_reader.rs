//! Seekable byte stream over one file of a torrent that is still downloading.
//!
//! The reader translates file-relative positions into the torrent's flat
//! content space and drives the engine's piece prioritization as it moves:
//! every read or seek shifts the read-ahead window to the cursor.

use crate::engine::{EngineTorrent, PieceReader};
use crate::entities::TorrentFile;
use crate::errors::DomainError;
use crate::services::stream_prioritizer::readahead_for;
use futures::stream::{self, Stream};
use std::io::SeekFrom;
use tracing::{debug, trace};

/// Chunk size used when turning a reader into a byte stream.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

pub struct FileReader {
    file: TorrentFile,
    inner: Option<Box<dyn PieceReader>>,
    position: u64, // relative to file.offset
    readahead: u64,
}

impl FileReader {
    /// Opens a reader positioned at the start of `file`.
    pub async fn open(torrent: &dyn EngineTorrent, file: TorrentFile) -> Result<Self, DomainError> {
        let metadata = torrent.metadata().ok_or_else(|| {
            DomainError::ReaderInit("torrent metadata has not been resolved yet".to_string())
        })?;

        let mut inner = torrent
            .new_reader()
            .map_err(|e| DomainError::ReaderInit(e.to_string()))?;

        let readahead = readahead_for(&file, metadata.piece_length);
        inner.set_readahead(readahead);
        inner.set_responsive();

        if let Err(e) = inner.seek(file.offset).await {
            inner.close();
            return Err(DomainError::ReaderInit(format!(
                "cannot seek to {} for {}: {e}",
                file.offset, file.path
            )));
        }

        debug!(file = %file.path, readahead, "opened file reader");

        Ok(Self {
            file,
            inner: Some(inner),
            position: 0,
            readahead,
        })
    }

    pub fn file(&self) -> &TorrentFile {
        &self.file
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn readahead(&self) -> u64 {
        self.readahead
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Reads at the cursor, suspending until the engine has the needed piece.
    /// Returns `Ok(0)` at the end of the file.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DomainError> {
        let inner = self.inner.as_mut().ok_or(DomainError::ReaderClosed)?;

        let remaining = self.file.length - self.position;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let wanted = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = inner.read(&mut buf[..wanted]).await?;
        self.position += n as u64;
        trace!(file = %self.file.path, n, position = self.position, "read");
        Ok(n)
    }

    /// Moves the cursor; the position is relative to the start of the file.
    /// On error the cursor is left where it was.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, DomainError> {
        let length = self.file.length;
        let inner = self.inner.as_mut().ok_or(DomainError::ReaderClosed)?;

        let requested: i128 = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => length as i128 + delta as i128,
        };
        if requested < 0 || requested > length as i128 {
            return Err(DomainError::SeekOutOfRange { requested, length });
        }

        let target = requested as u64;
        inner.seek(self.file.offset + target).await?;
        self.position = target;
        Ok(target)
    }

    /// Releases the engine reader. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.close();
            debug!(file = %self.file.path, position = self.position, "closed file reader");
        }
    }

    /// Streams up to `length` bytes from the cursor in chunks, closing the
    /// reader when done. Dropping the stream early closes it as well.
    pub fn into_stream(
        self,
        length: u64,
    ) -> impl Stream<Item = Result<Vec<u8>, DomainError>> + Send + 'static {
        stream::try_unfold((self, length), |(mut reader, remaining)| async move {
            if remaining == 0 {
                reader.close();
                return Ok(None);
            }
            let chunk = STREAM_CHUNK_SIZE.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let mut buf = vec![0u8; chunk];
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                reader.close();
                return Ok(None);
            }
            buf.truncate(n);
            Ok(Some((buf, (reader, remaining - n as u64))))
        })
    }
}

impl Drop for FileReader {
    fn drop(&mut self) {
        self.close();
    }
}
