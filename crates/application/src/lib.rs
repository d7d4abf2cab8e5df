pub mod player;
pub mod render;
pub mod session;

pub use player::{open_player, Player};
pub use render::{format_bytes, Renderer};
pub use session::{ClientSession, READY_POLL_INTERVAL};
