//! Error types for blockstream.

use thiserror::Error;

/// Primary error type for all blockstream operations.
#[derive(Error, Debug)]
pub enum BlockstreamError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The push connection failed or closed before a terminal event.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The server asserted failure with an explicit `error` frame.
    #[error("Server error: {0}")]
    Server(String),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A failure reconnecting cannot fix.
    #[error("Stream failed: {0}")]
    Failed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// A frame that could not be mapped onto a [`StreamEvent`](crate::types::StreamEvent).
///
/// Never escapes the engine: the frame is logged and dropped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown frame `{0}`")]
    UnknownFrame(String),

    #[error("`{frame}` payload is not valid JSON: {source}")]
    InvalidJson {
        frame: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{frame}` payload must be a JSON object")]
    NotAnObject { frame: String },

    #[error("`{frame}` payload is missing `{field}`")]
    MissingField { frame: String, field: &'static str },
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Network,
    Decode,
    Server,
    Configuration,
    Serialization,
    Usage,
    Unknown,
}

impl BlockstreamError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Io(_) => ErrorCategory::Transport,
            Self::Network(_) => ErrorCategory::Network,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Server(_) | Self::RetriesExhausted { .. } => ErrorCategory::Server,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) => ErrorCategory::Usage,
            Self::Failed(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether reconnecting could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Network
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BlockstreamError>;
