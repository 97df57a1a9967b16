//! HTTP byte ranges.

use std::fmt;

/// An inclusive byte range, open-ended when `last` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRange {
    first: u64,
    last: Option<u64>,
}

impl HttpRange {
    /// Closed range `[first, last]`. `None` when `last < first`.
    pub fn closed(first: u64, last: u64) -> Option<Self> {
        (last >= first).then_some(Self {
            first,
            last: Some(last),
        })
    }

    /// Everything from `first` to the end.
    pub fn from_offset(first: u64) -> Self {
        Self { first, last: None }
    }

    /// Parse a `Range` header value of the form `bytes=a-b` or `bytes=a-`.
    ///
    /// Anything else (suffix ranges, multiple ranges, garbage) is treated as
    /// no range at all rather than an error.
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?;
        let (first, last) = spec.split_once('-')?;

        let first = first.trim();
        if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let first: u64 = first.parse().ok()?;

        let last = last.trim();
        if last.is_empty() {
            return Some(Self::from_offset(first));
        }
        if !last.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::closed(first, last.parse().ok()?)
    }

    /// Open-ended range starting at the byte matching `offset_seconds` into
    /// a file of `size` bytes lasting `duration` seconds.
    pub fn from_offset_seconds(
        offset_seconds: &str,
        duration: Option<u32>,
        size: Option<u64>,
    ) -> Option<Self> {
        let duration = duration.filter(|d| *d > 0)?;
        let size = size?;
        let offset: f64 = offset_seconds.trim().parse().ok()?;
        if !offset.is_finite() || offset < 0.0 {
            return None;
        }

        let byte = (size as f64 * offset / f64::from(duration)).round() as u64;
        Some(Self::from_offset(byte))
    }

    pub fn first(&self) -> u64 {
        self.first
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn is_closed(&self) -> bool {
        self.last.is_some()
    }

    /// Number of bytes covered, `None` for an open range.
    pub fn len(&self) -> Option<u64> {
        self.last.map(|last| last - self.first + 1)
    }

    /// Close the range against a resource of `total` bytes.
    ///
    /// Returns `None` when the range starts at or past the end.
    pub fn clamp_to(&self, total: u64) -> Option<Self> {
        if self.first >= total {
            return None;
        }
        let last = self.last.map_or(total - 1, |l| l.min(total - 1));
        Self::closed(self.first, last)
    }

    /// `Content-Range` value for a resource of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        let last = self.last.unwrap_or(total.saturating_sub(1));
        format!("bytes {}-{}/{}", self.first, last, total)
    }
}

impl fmt::Display for HttpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last {
            Some(last) => write!(f, "bytes={}-{}", self.first, last),
            None => write!(f, "bytes={}-", self.first),
        }
    }
}
