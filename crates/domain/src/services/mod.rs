pub mod file_reader;
pub mod readiness;
pub mod stream_prioritizer;
pub mod torrent_client;

pub use file_reader::{FileReader, STREAM_CHUNK_SIZE};
pub use readiness::{ready_for_playback, ReadinessGate, ReadinessScope};
pub use stream_prioritizer::{readahead_for, urgent_piece_range, StreamPrioritizer};
pub use torrent_client::TorrentClient;
