//! Delivers the final snapshot of a session exactly once.

use chrono::Utc;
use tracing::debug;

use super::{StreamSession, Terminal};
use crate::types::StreamCompletion;

/// One-shot completion callback.
pub type CompletionSink = Box<dyn FnOnce(StreamCompletion) + Send>;

/// Owns the completion callback; firing consumes it.
pub struct CompletionFinalizer {
    sink: Option<CompletionSink>,
}

impl CompletionFinalizer {
    pub fn new(sink: CompletionSink) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn is_finalized(&self) -> bool {
        self.sink.is_none()
    }

    /// Build the completion from the session, deliver it, and clear the
    /// session's tracking state. Returns whether the callback ran.
    ///
    /// Later calls are no-ops. Nothing is delivered once the session's
    /// generation has been invalidated.
    pub fn finalize(&mut self, session: &mut StreamSession, terminal: Terminal) -> bool {
        let Some(sink) = self.sink.take() else {
            return false;
        };

        let completion = StreamCompletion {
            session_id: session.id(),
            message_id: session.target().message_id.clone(),
            is_error: terminal.is_error,
            reason: terminal.reason,
            anomalies: session.audit(),
            blocks: session.snapshot(),
            session_ref: terminal.session_ref,
            finished_at: Utc::now(),
        };
        session.clear();

        if !session.generation().is_current() {
            debug!(session_id = %completion.session_id, "completion suppressed for stale session");
            return false;
        }
        debug!(
            session_id = %completion.session_id,
            is_error = completion.is_error,
            blocks = completion.blocks.len(),
            "stream session finalized"
        );
        sink(completion);
        true
    }
}
