pub mod blocklist;
pub mod engine;
pub mod fetch;
pub mod metainfo;

pub use blocklist::{load_gzipped, BlocklistLoader, BLOCKLIST_CACHE_NAME};
pub use engine::{create_engine, MemoryEngine, MemoryTorrent, PeerRejection, PeerTransport, PieceBook};
pub use fetch::HttpFetcher;
pub use metainfo::{parse_descriptor, read_descriptor, ParsedTorrent};
