use bip_metainfo::Metainfo;
use domain::{DomainError, Torrent};
use sha1::{Digest, Sha1};
use std::path::{Component, Path};
use tracing::info;

/// A torrent descriptor decoded into the domain layout.
#[derive(Debug, Clone)]
pub struct ParsedTorrent {
    pub torrent: Torrent,
    pub piece_hashes: Vec<[u8; 20]>,
    pub trackers: Vec<String>,
}

/// Decodes the bencoded bytes of a `.torrent` file.
pub fn parse_descriptor(bytes: &[u8]) -> Result<ParsedTorrent, DomainError> {
    let metainfo = Metainfo::from_bytes(bytes)
        .map_err(|e| DomainError::TorrentAdd(format!("Invalid torrent file: {}", e)))?;
    let info = metainfo.info();

    // Info hash is the SHA1 of the bencoded info dictionary
    let mut hasher = Sha1::new();
    hasher.update(info.to_bytes());
    let info_hash = hex::encode(hasher.finalize());

    let entries: Vec<(String, u64)> = info
        .files()
        .map(|file| (display_path(file.path()), file.length()))
        .collect();

    let name = match info.directory() {
        Some(directory) => display_path(directory),
        None => entries
            .first()
            .map(|(path, _)| path.clone())
            .unwrap_or_else(|| info_hash.clone()),
    };

    let piece_hashes = info
        .pieces()
        .map(|piece| {
            <[u8; 20]>::try_from(piece).map_err(|_| {
                DomainError::TorrentAdd(format!("piece hash has {} bytes", piece.len()))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let torrent = Torrent::new(info_hash, name, info.piece_length(), entries)?;
    if piece_hashes.len() != torrent.piece_count() {
        return Err(DomainError::TorrentAdd(format!(
            "torrent declares {} pieces for {} bytes but carries {} hashes",
            torrent.piece_count(),
            torrent.total_size,
            piece_hashes.len()
        )));
    }

    let trackers = metainfo
        .main_tracker()
        .map(|t| vec![t.to_string()])
        .unwrap_or_default();

    info!("📋 Torrent info:");
    info!("   Name: {}", torrent.name);
    info!("   Info hash: {}", torrent.info_hash);
    info!("   Files: {}", torrent.files.len());
    info!("   Piece length: {} bytes", torrent.piece_length);
    info!("   Pieces: {}", piece_hashes.len());

    Ok(ParsedTorrent {
        torrent,
        piece_hashes,
        trackers,
    })
}

pub async fn read_descriptor(path: &Path) -> Result<ParsedTorrent, DomainError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DomainError::FileNotFound(path.display().to_string()),
        _ => DomainError::TorrentAdd(format!("cannot read {}: {e}", path.display())),
    })?;
    parse_descriptor(&bytes)
}

/// Joins path components with `/` regardless of platform.
fn display_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
