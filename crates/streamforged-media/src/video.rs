//! Output frame size negotiation for video transcodes.

use streamforged_common::{Dimension, MediaFile, VideoTranscodingSettings};

/// Largest accepted explicit width or height.
const MAX_REQUESTED_SIDE: u32 = 2000;

/// Parse an explicit `WxH` request. Out-of-range or malformed values yield
/// `None` so the caller falls back to the bitrate tiers.
pub fn parse_requested_size(value: &str) -> Option<Dimension> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().parse().ok()?;

    if width <= MAX_REQUESTED_SIDE && height <= MAX_REQUESTED_SIDE {
        Some(Dimension::new(width, height))
    } else {
        None
    }
}

/// Pick a frame size for `max_bit_rate` kbps, never upscaling the source.
pub fn suitable_size(max_bit_rate: Option<u32>, source: Option<Dimension>) -> Dimension {
    let Some(kbps) = max_bit_rate else {
        return Dimension::new(400, 224);
    };

    let (width, height) = match kbps {
        k if k < 400 => (400, 224),
        k if k < 600 => (480, 270),
        k if k < 1800 => (640, 360),
        _ => (960, 540),
    };

    let Some(source) = source else {
        return Dimension::new(width, height);
    };

    if source.width < width || source.height < height {
        return Dimension::new(even_floor(source.width), even_floor(source.height));
    }

    let aspect = f64::from(source.width) / f64::from(source.height);
    let height = (f64::from(width) / aspect).round() as u32;
    Dimension::new(even_floor(width), even_floor(height.min(source.height)))
}

/// Explicit size when valid, otherwise the tier table.
pub fn negotiate_size(
    requested: Option<&str>,
    max_bit_rate: Option<u32>,
    source: Option<Dimension>,
) -> Dimension {
    requested
        .and_then(parse_requested_size)
        .unwrap_or_else(|| suitable_size(max_bit_rate, source))
}

/// Settings for one video transcode of `file`.
pub fn video_settings(
    file: &MediaFile,
    requested_size: Option<&str>,
    max_bit_rate: Option<u32>,
    time_offset: u32,
    duration: Option<u32>,
    hls: bool,
) -> VideoTranscodingSettings {
    let size = negotiate_size(requested_size, max_bit_rate, file.dimension());
    VideoTranscodingSettings {
        width: size.width,
        height: size.height,
        time_offset,
        duration,
        hls,
    }
}

/// Largest even value not above `size`; encoders reject zero so 2 is the floor.
fn even_floor(size: u32) -> u32 {
    (size - size % 2).max(2)
}
