use serde::{Deserialize, Serialize};

/// Download priority of a piece, as a hint to the engine's piece picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PiecePriority {
    /// Not wanted.
    #[default]
    None = 0,
    Normal = 1,
    /// Inside a reader's read-ahead window.
    High = 2,
    /// Needed now, e.g. the start of the stream or the piece under a reader.
    Urgent = 3,
}

impl PiecePriority {
    pub fn is_wanted(self) -> bool {
        self != PiecePriority::None
    }
}

/// Snapshot of one piece as reported by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceState {
    pub index: usize,
    pub priority: PiecePriority,
    pub complete: bool,
}
