//! What the engine hands back to its consumer: live updates and the final completion.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentBlock, SessionId};
use crate::error::BlockstreamError;

/// One coalesced publish of the (possibly partial) block sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockUpdate {
    pub session_id: SessionId,
    /// Monotonic per session, starting at 1.
    pub sequence: u64,
    pub blocks: Arc<[ContentBlock]>,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionReason {
    /// The server sent a completion frame.
    Completed,
    /// The server sent an explicit `error` (or timeout) frame.
    ServerError { message: String },
    /// The push connection failed `attempts` times in a row.
    RetriesExhausted { attempts: u32, last_error: String },
    /// The connection failed with an error that reconnecting cannot fix.
    Failed { message: String },
}

/// Final, immutable result of a session. Delivered exactly once.
#[derive(Debug, Clone)]
pub struct StreamCompletion {
    pub session_id: SessionId,
    pub message_id: String,
    pub is_error: bool,
    pub reason: CompletionReason,
    pub blocks: Arc<[ContentBlock]>,
    /// Server-side session reference carried by the completion frame.
    pub session_ref: Option<String>,
    /// Non-fatal inconsistencies seen during the session.
    pub anomalies: Vec<Anomaly>,
    pub finished_at: DateTime<Utc>,
}

impl StreamCompletion {
    /// Error message for failed sessions.
    pub fn error_message(&self) -> Option<&str> {
        match &self.reason {
            CompletionReason::Completed if self.is_error => Some("stream completed with error"),
            CompletionReason::Completed => None,
            CompletionReason::ServerError { message } => Some(message),
            CompletionReason::RetriesExhausted { last_error, .. } => Some(last_error),
            CompletionReason::Failed { message } => Some(message),
        }
    }

    /// The failure as an error value, for callers that propagate with `?`.
    pub fn error(&self) -> Option<BlockstreamError> {
        match &self.reason {
            CompletionReason::Completed if self.is_error => {
                Some(BlockstreamError::Server("stream completed with error".into()))
            }
            CompletionReason::Completed => None,
            CompletionReason::ServerError { message } => {
                Some(BlockstreamError::Server(message.clone()))
            }
            CompletionReason::RetriesExhausted {
                attempts,
                last_error,
            } => Some(BlockstreamError::RetriesExhausted {
                attempts: *attempts,
                last_error: last_error.clone(),
            }),
            CompletionReason::Failed { message } => Some(BlockstreamError::Failed(message.clone())),
        }
    }
}

/// A non-fatal inconsistency, recorded for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// An invocation that never received a result.
    OrphanedInvocation { tool_id: String },
    /// A buffered result whose invocation never arrived.
    OrphanedResult { tool_id: String },
    DuplicateResult { tool_id: String },
    DuplicateInvocation { tool_id: String },
    MalformedFrame { frame: String, reason: String },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedInvocation { tool_id } => {
                write!(f, "tool invocation {tool_id} never received a result")
            }
            Self::OrphanedResult { tool_id } => {
                write!(f, "tool result {tool_id} has no matching invocation")
            }
            Self::DuplicateResult { tool_id } => write!(f, "duplicate tool result {tool_id}"),
            Self::DuplicateInvocation { tool_id } => {
                write!(f, "duplicate tool invocation {tool_id}")
            }
            Self::MalformedFrame { frame, reason } => {
                write!(f, "malformed `{frame}` frame: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn completion(is_error: bool, reason: CompletionReason) -> StreamCompletion {
        StreamCompletion {
            session_id: Uuid::new_v4(),
            message_id: "msg-1".into(),
            is_error,
            reason,
            blocks: Arc::from(Vec::new()),
            session_ref: None,
            anomalies: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn successful_completion_has_no_error() {
        let done = completion(false, CompletionReason::Completed);

        assert_eq!(done.error_message(), None);
        assert!(done.error().is_none());
    }

    #[test]
    fn exhausted_completion_converts_to_error() {
        let done = completion(
            true,
            CompletionReason::RetriesExhausted {
                attempts: 3,
                last_error: "connection reset".into(),
            },
        );

        assert_eq!(done.error_message(), Some("connection reset"));
        assert!(matches!(
            done.error(),
            Some(BlockstreamError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn failed_completion_is_not_retryable() {
        let done = completion(
            true,
            CompletionReason::Failed {
                message: "Configuration error: bad credentials".into(),
            },
        );

        let err = done.error().unwrap();
        assert_eq!(done.error_message(), Some("Configuration error: bad credentials"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn anomalies_render_for_logs() {
        let anomaly = Anomaly::MalformedFrame {
            frame: "tool_use".into(),
            reason: "missing tool_id".into(),
        };

        assert_eq!(anomaly.to_string(), "malformed `tool_use` frame: missing tool_id");
    }
}
