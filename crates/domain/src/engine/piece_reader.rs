use crate::errors::DomainError;
use async_trait::async_trait;

/// Sequential read handle over a torrent's flat content space.
///
/// Reading steers the engine: pieces under the cursor and inside the
/// read-ahead window are prioritized while the handle is open.
#[async_trait]
pub trait PieceReader: Send {
    /// Reads at the cursor, waiting until at least one byte is available.
    /// Returns 0 only at the end of the content space.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, DomainError>;

    /// Moves the cursor to an absolute content offset.
    async fn seek(&mut self, offset: u64) -> Result<u64, DomainError>;

    fn position(&self) -> u64;

    fn set_readahead(&mut self, bytes: u64);

    /// Prefer low latency for the next needed piece over throughput.
    fn set_responsive(&mut self);

    /// Releases the handle and its prioritization. Calling it again is a no-op.
    fn close(&mut self);
}
