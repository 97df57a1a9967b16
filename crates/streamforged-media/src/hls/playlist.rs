//! HLS playlist structures.
//!
//! Both playlist kinds render through [`std::fmt::Display`], so callers get
//! the `.m3u8` text with `to_string()`.

use crate::hls::BitRateSpec;
use crate::{Error, Result};
use std::fmt;

/// One fixed-duration slice of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset into the file in seconds.
    pub offset: u32,
    /// Length of the segment in seconds.
    pub duration: u32,
}

/// Split `total` seconds into `segment` second slices plus a trailing
/// remainder slice. The durations always add up to `total`.
pub fn plan_segments(total: u32, segment: u32) -> Result<Vec<Segment>> {
    if segment == 0 {
        return Err(Error::ZeroSegmentDuration);
    }

    let full = total / segment;
    let remainder = total % segment;

    let mut segments: Vec<Segment> = (0..full)
        .map(|i| Segment {
            offset: i * segment,
            duration: segment,
        })
        .collect();

    if remainder > 0 {
        segments.push(Segment {
            offset: full * segment,
            duration: remainder,
        });
    }

    Ok(segments)
}

/// A multi-bitrate master playlist.
#[derive(Debug, Clone, Default)]
pub struct VariantPlaylist {
    pub variants: Vec<VariantEntry>,
}

/// One rendition in a [`VariantPlaylist`].
#[derive(Debug, Clone)]
pub struct VariantEntry {
    pub spec: BitRateSpec,
    pub uri: String,
}

impl fmt::Display for VariantPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-VERSION:1")?;

        for variant in &self.variants {
            write!(
                f,
                "#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH={}",
                variant.spec.bandwidth()
            )?;
            if let Some(d) = variant.spec.dimension {
                write!(f, ",RESOLUTION={}", d)?;
            }
            writeln!(f)?;
            writeln!(f, "{}", variant.uri)?;
        }

        Ok(())
    }
}

/// A single-rendition playlist enumerating every segment.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    /// Target duration in seconds.
    pub target_duration: u32,
    /// Segment entries.
    pub segments: Vec<SegmentEntry>,
    /// Whether this is an ended playlist.
    pub ended: bool,
}

/// A segment entry in a [`MediaPlaylist`].
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    pub segment: Segment,
    pub uri: String,
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-VERSION:1")?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:0")?;

        for entry in &self.segments {
            writeln!(f, "#EXTINF:{},", entry.segment.duration)?;
            writeln!(f, "{}", entry.uri)?;
        }

        if self.ended {
            writeln!(f, "#EXT-X-ENDLIST")?;
        }

        Ok(())
    }
}
