//! Core types for blockstream.

pub mod block;
pub mod event;
pub mod outcome;

pub use block::*;
pub use event::*;
pub use outcome::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one streaming attempt.
pub type SessionId = Uuid;

/// What to stream: a message, optionally scoped to its conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamTarget {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl StreamTarget {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            conversation_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

impl From<&str> for StreamTarget {
    fn from(message_id: &str) -> Self {
        Self::new(message_id)
    }
}

impl From<String> for StreamTarget {
    fn from(message_id: String) -> Self {
        Self::new(message_id)
    }
}
