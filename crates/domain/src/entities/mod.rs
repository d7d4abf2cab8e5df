pub mod blocklist;
pub mod piece;
pub mod source;
pub mod stats;
pub mod stream;
pub mod torrent;
pub mod torrent_file;

pub use blocklist::*;
pub use piece::*;
pub use source::*;
pub use stats::*;
pub use stream::*;
pub use torrent::*;
pub use torrent_file::*;
