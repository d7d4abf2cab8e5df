pub mod piece_reader;
pub mod remote_fetcher;
pub mod torrent_engine;

pub use piece_reader::PieceReader;
pub use remote_fetcher::RemoteFetcher;
pub use torrent_engine::{EngineTorrent, TorrentEngine};
