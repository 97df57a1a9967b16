//! Error types for streamforged-media.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building playlists.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `bitRate=` entry did not match `<kbps>[@<w>x<h>]`.
    #[error("invalid bitRate specification: {0:?}")]
    InvalidBitRate(String),

    /// The media file has no known duration, so it cannot be segmented.
    #[error("unknown duration for media file {0}")]
    UnknownDuration(String),

    /// The segment duration must be positive.
    #[error("segment duration must be greater than zero")]
    ZeroSegmentDuration,
}

impl From<Error> for streamforged_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidBitRate(_) => streamforged_common::Error::Validation(err.to_string()),
            Error::UnknownDuration(_) | Error::ZeroSegmentDuration => {
                streamforged_common::Error::Internal(err.to_string())
            }
        }
    }
}
