//! # streamforged-media
//!
//! Playlist and rendition logic that does not touch the network or any
//! subprocess:
//!
//! - [`hls`]: `bitRate=` parsing, segment planning, variant and media playlists
//! - [`video`]: choosing an even-sized output frame for a bitrate

mod error;
pub mod hls;
pub mod video;

pub use error::{Error, Result};
pub use hls::{BitRateSpec, HlsPlaylistGenerator, Playlist};
