//! Error types for streamforged-av.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while locating or launching transcoders.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// A process could not be started.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool failed to execute.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

impl From<Error> for streamforged_common::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::ToolNotFound { tool } => {
                streamforged_common::Error::tool(tool, "not found on PATH")
            }
            Error::Spawn { tool, source } => {
                streamforged_common::Error::tool(tool, format!("failed to spawn: {source}"))
            }
            Error::ToolFailed { tool, message } => streamforged_common::Error::tool(tool, message),
            Error::InvalidInput(msg) => streamforged_common::Error::Validation(msg),
            Error::Io(source) => streamforged_common::Error::Io { source },
        }
    }
}
