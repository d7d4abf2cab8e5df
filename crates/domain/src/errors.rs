use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    #[error("Could not add torrent: {0}")]
    TorrentAdd(String),

    #[error("Could not fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid torrent reference: {0}")]
    InvalidReference(String),

    #[error("Torrent metadata has not been resolved yet")]
    MetadataUnresolved,

    #[error("Could not open file reader: {0}")]
    ReaderInit(String),

    #[error("Seek to {requested} is outside of file of length {length}")]
    SeekOutOfRange { requested: i128, length: u64 },

    #[error("Reader has been closed")]
    ReaderClosed,

    #[error("Torrent engine has been closed")]
    EngineClosed,

    #[error("Range not satisfiable for length {0}")]
    RangeNotSatisfiable(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid piece {index}: {reason}")]
    InvalidPiece { index: usize, reason: String },

    #[error("Blocklist error: {0}")]
    Blocklist(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl DomainError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that abort startup rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EngineInit(_)
                | Self::TorrentAdd(_)
                | Self::Fetch { .. }
                | Self::FileNotFound(_)
                | Self::InvalidReference(_)
        )
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::IoError(err.to_string())
    }
}
