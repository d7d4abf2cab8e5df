use crate::errors::DomainError;
use serde::{Deserialize, Serialize};

/// A satisfiable byte range `[start, end]` (inclusive) over a file of `total_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl StreamRange {
    pub fn new(start: u64, end: Option<u64>, total_size: u64) -> Result<Self, DomainError> {
        if total_size == 0 || start >= total_size {
            return Err(DomainError::RangeNotSatisfiable(total_size));
        }
        let last = total_size - 1;
        let end = end.unwrap_or(last).min(last);
        if end < start {
            return Err(DomainError::RangeNotSatisfiable(total_size));
        }
        Ok(Self {
            start,
            end,
            total_size,
        })
    }

    /// Parses an HTTP `Range` header value.
    ///
    /// Returns `Ok(None)` when the header should be ignored (malformed, another
    /// unit, or several ranges) and the full body served instead.
    pub fn parse(header: &str, total_size: u64) -> Result<Option<Self>, DomainError> {
        let Some(spec) = header.trim().strip_prefix("bytes=") else {
            return Ok(None);
        };
        if spec.contains(',') {
            return Ok(None);
        }
        let Some((start_str, end_str)) = spec.trim().split_once('-') else {
            return Ok(None);
        };
        let (start_str, end_str) = (start_str.trim(), end_str.trim());

        if start_str.is_empty() {
            // Suffix range: the last N bytes.
            let Ok(suffix) = end_str.parse::<u64>() else {
                return Ok(None);
            };
            if suffix == 0 {
                return Err(DomainError::RangeNotSatisfiable(total_size));
            }
            let start = total_size.saturating_sub(suffix);
            return Self::new(start, None, total_size).map(Some);
        }

        let Ok(start) = start_str.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_str.is_empty() {
            None
        } else {
            match end_str.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return Ok(None),
            }
        };
        Self::new(start, end, total_size).map(Some)
    }

    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range_header(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_range() {
        let range = StreamRange::parse("bytes=500-999", 1000).unwrap().unwrap();
        assert_eq!((range.start, range.end), (500, 999));
        assert_eq!(range.length(), 500);
        assert_eq!(range.content_range_header(), "bytes 500-999/1000");
    }

    #[test]
    fn open_and_suffix_ranges_clamp_to_file() {
        let open = StreamRange::parse("bytes=900-", 1000).unwrap().unwrap();
        assert_eq!((open.start, open.end), (900, 999));

        let clamped = StreamRange::parse("bytes=0-5000", 1000).unwrap().unwrap();
        assert_eq!(clamped.end, 999);

        let suffix = StreamRange::parse("bytes=-100", 1000).unwrap().unwrap();
        assert_eq!((suffix.start, suffix.end), (900, 999));

        let whole = StreamRange::parse("bytes=-5000", 1000).unwrap().unwrap();
        assert_eq!(whole.start, 0);
    }

    #[test]
    fn start_past_end_is_unsatisfiable() {
        assert!(matches!(
            StreamRange::parse("bytes=1000-", 1000),
            Err(DomainError::RangeNotSatisfiable(1000))
        ));
        assert!(StreamRange::parse("bytes=-0", 1000).is_err());
        assert!(StreamRange::parse("bytes=0-", 0).is_err());
    }

    #[test]
    fn ignores_what_it_does_not_understand() {
        assert_eq!(StreamRange::parse("items=0-1", 1000).unwrap(), None);
        assert_eq!(StreamRange::parse("bytes=0-1,5-9", 1000).unwrap(), None);
        assert_eq!(StreamRange::parse("bytes=abc", 1000).unwrap(), None);
        assert_eq!(StreamRange::parse("bytes=10-2", 1000).unwrap(), None);
    }
}
