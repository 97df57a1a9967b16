//! Core type definitions shared across the delivery pipeline.
//!
//! These are read-only snapshots handed out by the metadata and user
//! collaborators. The streaming core never writes them back.

use crate::ids::MediaFileId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Container formats treated as video.
const VIDEO_FORMATS: &[&str] = &[
    "3gp", "asf", "avi", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg", "mts", "ogv",
    "ts", "webm", "wmv",
];

/// Width and height of a video frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A media file as known to the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: MediaFileId,
    pub path: PathBuf,
    /// Duration in whole seconds, if known.
    #[serde(default)]
    pub duration_secs: Option<u32>,
    /// Source bitrate in kbps, if known.
    #[serde(default)]
    pub bit_rate: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Lowercase container suffix, e.g. `mp3` or `mkv`.
    pub format: String,
    /// Size on disk in bytes.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl MediaFile {
    /// Whether the container is a video format.
    pub fn is_video(&self) -> bool {
        let format = self.format.to_ascii_lowercase();
        VIDEO_FORMATS.contains(&format.as_str())
    }

    /// Source frame size, when both width and height are known.
    pub fn dimension(&self) -> Option<Dimension> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Dimension::new(w, h)),
            _ => None,
        }
    }

    /// Title falling back to the file name.
    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `Artist - Title`, or just the title when the artist is unknown.
    pub fn now_playing(&self) -> String {
        match &self.artist {
            Some(artist) if !artist.is_empty() => format!("{} - {}", artist, self.display_title()),
            _ => self.display_title(),
        }
    }
}

/// A user as resolved by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    /// Whether the user may stream media at all.
    #[serde(default)]
    pub stream_role: bool,
    /// Per-user bitrate cap in kbps, 0 meaning unlimited.
    #[serde(default)]
    pub max_bit_rate: u32,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream_role: true,
            max_bit_rate: 0,
        }
    }
}

/// Parameters that shape a video transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoTranscodingSettings {
    /// Output width, always even.
    pub width: u32,
    /// Output height, always even.
    pub height: u32,
    /// Start offset into the source in seconds.
    pub time_offset: u32,
    /// Duration to transcode in seconds, `None` for the remainder.
    pub duration: Option<u32>,
    /// Whether the output is an HLS segment.
    pub hls: bool,
}
