//! Per-session state: the working block sequence, pairing state, and
//! diagnostics for one streaming attempt.

pub mod finalize;
pub mod generation;

pub use finalize::{CompletionFinalizer, CompletionSink};
pub use generation::{GenerationCounter, GenerationToken};

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::accumulator::{BlockAccumulator, PairingResolver, PendingResult, ResultOutcome, StartOutcome};
use crate::types::{
    Anomaly, BlockUpdate, CompletionReason, ContentBlock, SessionId, StreamEvent, StreamTarget,
    ToolInvocation,
};

/// Result of applying one event to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The block sequence changed; an update should be staged.
    Mutated,
    Unchanged,
    /// The event ends the session.
    Terminal(Terminal),
}

/// How a session ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    pub reason: CompletionReason,
    pub is_error: bool,
    pub session_ref: Option<String>,
}

impl Terminal {
    pub fn completed(is_error: bool, session_ref: Option<String>) -> Self {
        Self {
            reason: CompletionReason::Completed,
            is_error,
            session_ref,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self {
            reason: CompletionReason::ServerError {
                message: message.into(),
            },
            is_error: true,
            session_ref: None,
        }
    }

    /// Connection failure that is not worth retrying.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            reason: CompletionReason::Failed {
                message: message.into(),
            },
            is_error: true,
            session_ref: None,
        }
    }

    pub fn exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self {
            reason: CompletionReason::RetriesExhausted {
                attempts,
                last_error: last_error.into(),
            },
            is_error: true,
            session_ref: None,
        }
    }
}

/// One streaming attempt for one message.
#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    target: StreamTarget,
    generation: GenerationToken,
    blocks: BlockAccumulator,
    pairing: PairingResolver,
    anomalies: Vec<Anomaly>,
    sequence: u64,
}

impl StreamSession {
    pub fn new(target: StreamTarget, generation: GenerationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            generation,
            blocks: BlockAccumulator::new(),
            pairing: PairingResolver::new(),
            anomalies: Vec::new(),
            sequence: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    pub fn generation(&self) -> &GenerationToken {
        &self.generation
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        self.blocks.blocks()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Apply a decoded event to the working sequence.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        match event {
            StreamEvent::TextDelta { text } => changed(self.blocks.push_text(&text)),
            StreamEvent::ReasoningDelta { text, signature } => {
                changed(self.blocks.push_reasoning(&text, signature.as_deref()))
            }
            StreamEvent::ToolInvocationStart {
                id,
                name,
                input,
                active_description,
            } => self.start_invocation(id, name, input, active_description),
            StreamEvent::ToolInvocationResult {
                id,
                output,
                is_error,
            } => self.apply_result(PendingResult {
                id,
                output,
                is_error,
            }),
            StreamEvent::Completion {
                is_error,
                session_ref,
            } => Applied::Terminal(Terminal::completed(is_error, session_ref)),
            StreamEvent::StreamError { message } => {
                Applied::Terminal(Terminal::server_error(message))
            }
            StreamEvent::Heartbeat => Applied::Unchanged,
        }
    }

    fn start_invocation(
        &mut self,
        id: String,
        name: String,
        input: serde_json::Value,
        active_description: Option<String>,
    ) -> Applied {
        self.blocks.close_text();
        let pending = match self.pairing.on_invocation_start(&id) {
            StartOutcome::Duplicate => {
                debug!(session_id = %self.id, tool_id = %id, "duplicate tool invocation dropped");
                self.anomalies.push(Anomaly::DuplicateInvocation { tool_id: id });
                return Applied::Unchanged;
            }
            StartOutcome::Fresh { pending } => pending,
        };

        let mut invocation = ToolInvocation::new(id, name, input);
        invocation.active_description = active_description;
        if let Some(result) = pending {
            debug!(session_id = %self.id, tool_id = %invocation.id, "applying buffered tool result");
            invocation.resolve(result.output, result.is_error);
        }
        self.blocks.push_invocation(invocation);
        Applied::Mutated
    }

    fn apply_result(&mut self, result: PendingResult) -> Applied {
        // Any tool frame ends the open text block, replays included.
        self.blocks.close_text();
        let tool_id = result.id.clone();
        match self.pairing.on_result(result, &mut self.blocks) {
            ResultOutcome::Applied => Applied::Mutated,
            ResultOutcome::Buffered => {
                debug!(session_id = %self.id, tool_id = %tool_id, "tool result arrived before its invocation");
                Applied::Unchanged
            }
            ResultOutcome::Duplicate => {
                debug!(session_id = %self.id, tool_id = %tool_id, "duplicate tool result dropped");
                self.anomalies.push(Anomaly::DuplicateResult { tool_id });
                Applied::Unchanged
            }
        }
    }

    pub fn record_anomaly(&mut self, anomaly: Anomaly) {
        self.anomalies.push(anomaly);
    }

    /// Immutable copy of the working sequence.
    pub fn snapshot(&self) -> Arc<[ContentBlock]> {
        self.blocks.snapshot()
    }

    /// Snapshot tagged with the next publish sequence number.
    pub fn next_update(&mut self) -> BlockUpdate {
        self.sequence += 1;
        BlockUpdate {
            session_id: self.id,
            sequence: self.sequence,
            blocks: self.snapshot(),
        }
    }

    /// Record orphaned invocations and results, then hand back every
    /// anomaly seen during the session.
    pub fn audit(&mut self) -> Vec<Anomaly> {
        let invocations: Vec<&ToolInvocation> = self.blocks.invocations().collect();
        let orphans = self.pairing.audit(&invocations);
        for anomaly in &orphans {
            warn!(
                session_id = %self.id,
                message_id = %self.target.message_id,
                %anomaly,
                "stream anomaly at completion"
            );
        }
        let mut anomalies = std::mem::take(&mut self.anomalies);
        anomalies.extend(orphans);
        anomalies
    }

    /// Drop all per-session tracking state.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.pairing.clear();
        self.anomalies.clear();
    }
}

fn changed(mutated: bool) -> Applied {
    if mutated {
        Applied::Mutated
    } else {
        Applied::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session() -> StreamSession {
        StreamSession::new(StreamTarget::new("msg-1"), GenerationCounter::new().advance())
    }

    fn start(id: &str, name: &str) -> StreamEvent {
        StreamEvent::ToolInvocationStart {
            id: id.into(),
            name: name.into(),
            input: json!({}),
            active_description: None,
        }
    }

    fn result(id: &str, output: &str) -> StreamEvent {
        StreamEvent::ToolInvocationResult {
            id: id.into(),
            output: json!(output),
            is_error: false,
        }
    }

    #[test]
    fn pairing_order_does_not_change_final_state() {
        let mut forward = session();
        forward.apply(start("t1", "search"));
        forward.apply(result("t1", "ok"));

        let mut reversed = session();
        reversed.apply(result("t1", "ok"));
        reversed.apply(start("t1", "search"));

        assert_eq!(forward.blocks(), reversed.blocks());
        assert_eq!(
            reversed.blocks()[0].as_tool_invocation().unwrap().output,
            Some(json!("ok"))
        );
    }

    #[test]
    fn second_result_does_not_change_output() {
        let mut session = session();
        session.apply(start("t1", "search"));
        session.apply(result("t1", "first"));

        assert_eq!(session.apply(result("t1", "second")), Applied::Unchanged);

        assert_eq!(
            session.blocks()[0].as_tool_invocation().unwrap().output,
            Some(json!("first"))
        );
        assert_eq!(
            session.anomalies(),
            &[Anomaly::DuplicateResult { tool_id: "t1".into() }]
        );
    }

    #[test]
    fn tool_result_ends_open_text_block() {
        let mut session = session();
        session.apply(start("t1", "search"));
        session.apply(StreamEvent::TextDelta { text: "a".into() });
        session.apply(result("t1", "ok"));
        session.apply(StreamEvent::TextDelta { text: "b".into() });

        let texts: Vec<_> = session.blocks().iter().filter_map(ContentBlock::as_text).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn replayed_tool_frames_still_split_text() {
        let mut session = session();
        session.apply(start("t1", "search"));
        session.apply(result("t1", "ok"));
        session.apply(StreamEvent::TextDelta { text: "a".into() });
        session.apply(start("t1", "search"));
        session.apply(StreamEvent::TextDelta { text: "b".into() });
        session.apply(result("t1", "ok"));
        session.apply(StreamEvent::TextDelta { text: "c".into() });

        let texts: Vec<_> = session.blocks().iter().filter_map(ContentBlock::as_text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(
            session.anomalies(),
            &[
                Anomaly::DuplicateInvocation { tool_id: "t1".into() },
                Anomaly::DuplicateResult { tool_id: "t1".into() },
            ]
        );
    }

    #[test]
    fn heartbeat_does_not_split_text() {
        let mut session = session();
        session.apply(StreamEvent::TextDelta { text: "a".into() });
        assert_eq!(session.apply(StreamEvent::Heartbeat), Applied::Unchanged);
        session.apply(StreamEvent::TextDelta { text: "b".into() });

        assert_eq!(session.blocks(), &[ContentBlock::text("text-1", "ab")]);
    }

    #[test]
    fn terminal_events_carry_reason() {
        let mut session = session();

        assert_eq!(
            session.apply(StreamEvent::StreamError { message: "boom".into() }),
            Applied::Terminal(Terminal::server_error("boom"))
        );
        assert_eq!(
            session.apply(StreamEvent::Completion {
                is_error: false,
                session_ref: Some("s-1".into()),
            }),
            Applied::Terminal(Terminal::completed(false, Some("s-1".into())))
        );
    }

    #[test]
    fn audit_collects_recorded_and_orphaned_anomalies() {
        let mut session = session();
        session.apply(start("t1", "search"));
        session.apply(result("t7", "stray"));
        session.record_anomaly(Anomaly::MalformedFrame {
            frame: "tool_use".into(),
            reason: "missing id".into(),
        });

        let anomalies = session.audit();

        assert_eq!(anomalies.len(), 3);
        assert!(anomalies.contains(&Anomaly::OrphanedInvocation { tool_id: "t1".into() }));
        assert!(anomalies.contains(&Anomaly::OrphanedResult { tool_id: "t7".into() }));
        assert!(session.anomalies().is_empty());
    }
}
