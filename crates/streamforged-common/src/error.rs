//! Unified error type for streamforged.
//!
//! Every crate funnels its failures into [`Error`], which carries enough
//! context for the HTTP layer to derive a status code via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes of the streaming pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media_file", "playlist").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller lacks permission for the requested action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, lame, etc.) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The server cannot take on more work right now.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Unavailable(_) => 503,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("media_file", 42);
        assert_eq!(err.to_string(), "media_file not found: 42");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn forbidden_display() {
        let err = Error::Forbidden("streaming role missing".into());
        assert_eq!(err.to_string(), "Forbidden: streaming role missing");
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn validation_display() {
        let err = Error::validation("bad bitRate");
        assert_eq!(err.to_string(), "Validation error: bad bitRate");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn unavailable_is_503() {
        let err = Error::Unavailable("too many streams".into());
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn internal_display() {
        let err = Error::Internal("unexpected state".into());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
        assert_eq!(err.http_status(), 500);
    }
}
