use crate::errors::DomainError;
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IpRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

/// Peer addresses that must not be connected to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist {
    ranges: Vec<IpRange>, // sorted by start, non-overlapping
    skipped_lines: usize,
}

impl Blocklist {
    /// Parses the P2P plaintext format, one `description:first-last` per line.
    /// Comments (`#`) and blank lines are ignored; malformed lines are skipped
    /// and counted.
    pub fn parse_p2p(text: &str) -> Result<Self, DomainError> {
        let mut ranges = Vec::new();
        let mut skipped_lines = 0;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Some(range) => ranges.push(range),
                None => skipped_lines += 1,
            }
        }

        if ranges.is_empty() && skipped_lines > 0 {
            return Err(DomainError::Blocklist(format!(
                "no valid ranges in {skipped_lines} lines"
            )));
        }

        Ok(Self::from_ranges(ranges, skipped_lines))
    }

    pub fn from_ranges(mut ranges: Vec<IpRange>, skipped_lines: usize) -> Self {
        ranges.sort();
        let mut merged: Vec<IpRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if u32::from(range.start) <= u32::from(last.end).saturating_add(1) => {
                    if range.end > last.end {
                        last.end = range.end;
                    }
                }
                _ => merged.push(range),
            }
        }
        Self {
            ranges: merged,
            skipped_lines,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let v4 = match ip {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => return false,
            },
        };
        let idx = self.ranges.partition_point(|r| r.start <= v4);
        idx > 0 && self.ranges[idx - 1].end >= v4
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

fn parse_line(line: &str) -> Option<IpRange> {
    // The description may itself contain colons.
    let (_, addresses) = line.rsplit_once(':')?;
    let (start, end) = addresses.split_once('-')?;
    let start: Ipv4Addr = start.trim().parse().ok()?;
    let end: Ipv4Addr = end.trim().parse().ok()?;
    if start > end {
        return None;
    }
    Some(IpRange { start, end })
}
