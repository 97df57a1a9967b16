//! Output wrapper that only lets an [`HttpRange`] through.

use super::range::HttpRange;
use std::io::{self, Write};

/// Discards bytes outside `range` and forwards the rest to the inner sink.
///
/// Every write is reported as fully consumed, including discarded bytes, so
/// upstream copy loops keep draining their source.
#[derive(Debug)]
pub struct RangeWriter<W> {
    inner: W,
    range: Option<HttpRange>,
    /// Offset of the next incoming byte in the full output.
    position: u64,
}

impl<W: Write> RangeWriter<W> {
    pub fn new(inner: W, range: Option<HttpRange>) -> Self {
        Self::starting_at(inner, range, 0)
    }

    /// For sources that already skipped `offset` bytes themselves (a seeked
    /// file), so incoming bytes are numbered from `offset`.
    pub fn starting_at(inner: W, range: Option<HttpRange>, offset: u64) -> Self {
        Self {
            inner,
            range,
            position: offset,
        }
    }

    /// Offset of the next byte in the full output.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether the closed range has been fully delivered.
    pub fn is_complete(&self) -> bool {
        matches!(self.range.and_then(|r| r.last()), Some(last) if self.position > last)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for RangeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        let start = self.position;
        self.position += len;

        let Some(range) = self.range else {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        };

        let from = range.first().saturating_sub(start).min(len);
        let to = match range.last() {
            Some(last) => (last + 1).saturating_sub(start).min(len),
            None => len,
        };

        if from < to {
            self.inner.write_all(&buf[from as usize..to as usize])?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
