//! HLS playlist generation.
//!
//! [`HlsPlaylistGenerator`] decides between a variant playlist (several
//! bitrates) and a segment-enumerated media playlist (zero or one bitrate).
//! URL construction and signing stay with the caller, passed in as closures.

mod bitrate;
mod playlist;

pub use bitrate::{parse_bit_rates, BitRateSpec};
pub use playlist::{
    plan_segments, MediaPlaylist, Segment, SegmentEntry, VariantEntry, VariantPlaylist,
};

use crate::{Error, Result};
use streamforged_common::MediaFile;

/// Default target duration of one media segment.
pub const DEFAULT_SEGMENT_DURATION: u32 = 10;

/// Either kind of generated playlist.
#[derive(Debug, Clone)]
pub enum Playlist {
    Variant(VariantPlaylist),
    Media(MediaPlaylist),
}

impl std::fmt::Display for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Playlist::Variant(p) => std::fmt::Display::fmt(p, f),
            Playlist::Media(p) => std::fmt::Display::fmt(p, f),
        }
    }
}

/// Builds `.m3u8` playlists for a media file.
#[derive(Debug, Clone, Copy)]
pub struct HlsPlaylistGenerator {
    segment_duration: u32,
}

impl Default for HlsPlaylistGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_DURATION)
    }
}

impl HlsPlaylistGenerator {
    pub fn new(segment_duration: u32) -> Self {
        Self { segment_duration }
    }

    pub fn segment_duration(&self) -> u32 {
        self.segment_duration
    }

    /// Generate the playlist for `file`.
    ///
    /// With two or more bitrates, `variant_url` is called once per bitrate.
    /// Otherwise `segment_url` is called once per segment with the single
    /// bitrate, if any. Fails when the file has no known duration and a
    /// media playlist is needed.
    pub fn generate<V, S>(
        &self,
        file: &MediaFile,
        bit_rates: &[BitRateSpec],
        mut variant_url: V,
        mut segment_url: S,
    ) -> Result<Playlist>
    where
        V: FnMut(&BitRateSpec) -> String,
        S: FnMut(&Segment, Option<&BitRateSpec>) -> String,
    {
        if bit_rates.len() > 1 {
            let variants = bit_rates
                .iter()
                .map(|spec| VariantEntry {
                    spec: *spec,
                    uri: variant_url(spec),
                })
                .collect();
            return Ok(Playlist::Variant(VariantPlaylist { variants }));
        }

        let duration = file
            .duration_secs
            .ok_or_else(|| Error::UnknownDuration(file.id.to_string()))?;
        let spec = bit_rates.first();

        let segments = plan_segments(duration, self.segment_duration)?
            .into_iter()
            .map(|segment| SegmentEntry {
                uri: segment_url(&segment, spec),
                segment,
            })
            .collect();

        Ok(Playlist::Media(MediaPlaylist {
            target_duration: self.segment_duration,
            segments,
            ended: true,
        }))
    }
}
