use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    pub index: usize,
    /// `/`-separated path inside the torrent, including the torrent directory.
    pub path: String,
    pub length: u64,
    /// Byte offset of the file within the torrent's concatenated content.
    pub offset: u64,
}

impl TorrentFile {
    pub fn new(index: usize, path: String, length: u64, offset: u64) -> Self {
        Self {
            index,
            path,
            length,
            offset,
        }
    }

    pub fn end_offset(&self) -> u64 {
        self.offset + self.length
    }

    pub fn contains_byte(&self, byte_offset: u64) -> bool {
        byte_offset >= self.offset && byte_offset < self.end_offset()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Content type guessed from the extension; unknown types are served as
    /// raw bytes.
    pub fn mime_type(&self) -> &'static str {
        const TYPES: &[(&str, &str)] = &[
            ("mp4", "video/mp4"),
            ("m4v", "video/x-m4v"),
            ("mkv", "video/x-matroska"),
            ("webm", "video/webm"),
            ("avi", "video/x-msvideo"),
            ("mov", "video/quicktime"),
            ("wmv", "video/x-ms-wmv"),
            ("flv", "video/x-flv"),
            ("ogv", "video/ogg"),
            ("ts", "video/mp2t"),
            ("mp3", "audio/mpeg"),
            ("flac", "audio/flac"),
            ("m4a", "audio/mp4"),
            ("srt", "application/x-subrip"),
        ];

        let Some(extension) = std::path::Path::new(&self.path)
            .extension()
            .and_then(|s| s.to_str())
        else {
            return "application/octet-stream";
        };
        TYPES
            .iter()
            .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
            .map_or("application/octet-stream", |(_, mime)| mime)
    }
}
