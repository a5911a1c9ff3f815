//! Inbound frames and the typed events decoded from them.

use serde::{Deserialize, Serialize};

/// A raw frame as delivered by a transport: a frame name plus its payload.
///
/// SSE maps `event:` to `name` and `data:` to `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    pub name: String,
    pub data: String,
}

impl RawFrame {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Frame with a JSON payload.
    pub fn json(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(name, payload.to_string())
    }
}

/// Closed set of events the engine understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolInvocationStart {
        id: String,
        name: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        active_description: Option<String>,
    },
    ToolInvocationResult {
        id: String,
        output: serde_json::Value,
        is_error: bool,
    },
    Completion {
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_ref: Option<String>,
    },
    StreamError {
        message: String,
    },
    Heartbeat,
}

impl StreamEvent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ReasoningDelta { .. } => "reasoning_delta",
            Self::ToolInvocationStart { .. } => "tool_invocation_start",
            Self::ToolInvocationResult { .. } => "tool_invocation_result",
            Self::Completion { .. } => "completion",
            Self::StreamError { .. } => "stream_error",
            Self::Heartbeat => "heartbeat",
        }
    }
}
