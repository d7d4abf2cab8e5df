//! User supplied torrent references.
//!
//! A reference is either a magnet URI, an HTTP(S) URL pointing at a torrent
//! descriptor, or a path to a descriptor on the local disk.

use crate::errors::DomainError;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnetLink {
    /// Lowercase hex info hash.
    pub info_hash: String,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
    /// The URI exactly as the user gave it.
    pub uri: String,
}

impl MagnetLink {
    /// Parses `magnet:?xt=urn:btih:<hash>&dn=<name>&tr=<tracker>`.
    /// The info hash may be 40 hex characters or 32 base32 characters.
    pub fn parse(uri: &str) -> Result<Self, DomainError> {
        let query = uri.strip_prefix("magnet:?").ok_or_else(|| {
            DomainError::InvalidReference("magnet URI must start with 'magnet:?'".to_string())
        })?;

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for param in query.split('&').filter(|p| !p.is_empty()) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = percent_decode_str(&value.replace('+', " "))
                .decode_utf8_lossy()
                .into_owned();

            match key {
                "xt" => {
                    if let Some(hash) = value.strip_prefix("urn:btih:") {
                        info_hash = Some(normalize_info_hash(hash)?);
                    }
                }
                "dn" => display_name = Some(value),
                "tr" if !value.is_empty() => trackers.push(value),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            DomainError::InvalidReference("magnet URI has no urn:btih info hash".to_string())
        })?;

        Ok(Self {
            info_hash,
            display_name,
            trackers,
            uri: uri.to_string(),
        })
    }
}

fn normalize_info_hash(hash: &str) -> Result<String, DomainError> {
    match hash.len() {
        40 => {
            let bytes = hex::decode(hash)
                .map_err(|e| DomainError::InvalidReference(format!("bad hex info hash: {e}")))?;
            Ok(hex::encode(bytes))
        }
        32 => base32_decode(hash)
            .map(hex::encode)
            .ok_or_else(|| DomainError::InvalidReference(format!("bad base32 info hash: {hash}"))),
        n => Err(DomainError::InvalidReference(format!(
            "info hash has {n} characters, expected 40 (hex) or 32 (base32)"
        ))),
    }
}

/// RFC 4648 base32 without padding, as used by 32-character magnet hashes.
fn base32_decode(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let mut bits = 0u64;
    let mut bit_count = 0u32;
    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    for c in input.bytes().map(|c| c.to_ascii_uppercase()) {
        let value = ALPHABET.iter().position(|&x| x == c)? as u64;
        bits = (bits << 5) | value;
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            output.push((bits >> bit_count) as u8);
            bits &= (1 << bit_count) - 1;
        }
    }
    Some(output)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    Magnet(MagnetLink),
    Remote(Url),
    Local(PathBuf),
}

impl TorrentSource {
    pub fn parse(reference: &str) -> Result<Self, DomainError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(DomainError::InvalidReference(
                "empty torrent reference".to_string(),
            ));
        }

        if reference.starts_with("magnet:") {
            return MagnetLink::parse(reference).map(TorrentSource::Magnet);
        }

        let lowered = reference.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            let url = Url::parse(reference)
                .map_err(|e| DomainError::InvalidReference(format!("{reference}: {e}")))?;
            return Ok(TorrentSource::Remote(url));
        }

        Ok(TorrentSource::Local(PathBuf::from(reference)))
    }
}

impl fmt::Display for TorrentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentSource::Magnet(magnet) => write!(f, "magnet {}", magnet.info_hash),
            TorrentSource::Remote(url) => write!(f, "{url}"),
            TorrentSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
