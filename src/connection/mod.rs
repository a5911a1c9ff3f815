//! Push-connection lifecycle: state machine, transports, reconnect policy.

pub mod sse;
pub mod transport;

pub use sse::SseTransport;
pub use transport::{FrameStream, Transport};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::BlockstreamError;
use crate::session::GenerationToken;
use crate::types::SessionId;
use crate::util::BackoffPolicy;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    /// Waiting out the backoff before the next attempt.
    ClosedRetrying,
    /// Gave up after the maximum number of attempts.
    ClosedExhausted,
    /// Finished through a completion or error frame.
    ClosedTerminal,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::ClosedExhausted | Self::ClosedTerminal)
    }
}

/// What to do after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Tracks one session's connection state and retry budget.
///
/// State changes are broadcast on a watch channel, but only while the
/// session's generation is current.
#[derive(Debug)]
pub struct ConnectionManager {
    session_id: SessionId,
    state: ConnectionState,
    retry_count: u32,
    policy: BackoffPolicy,
    generation: GenerationToken,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionManager {
    pub fn new(
        session_id: SessionId,
        policy: BackoffPolicy,
        generation: GenerationToken,
        state_tx: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        Self {
            session_id,
            state: ConnectionState::Idle,
            retry_count: 0,
            policy,
            generation,
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn begin_attempt(&mut self) {
        self.transition(ConnectionState::Connecting);
    }

    pub fn opened(&mut self) {
        self.transition(ConnectionState::Open);
    }

    /// A frame was processed successfully; the retry budget refills.
    pub fn event_processed(&mut self) {
        if self.retry_count > 0 {
            debug!(session_id = %self.session_id, "connection healthy again, retry count reset");
            self.retry_count = 0;
        }
    }

    /// Record an abnormal close and decide whether to reconnect.
    pub fn transport_failed(&mut self, err: &BlockstreamError) -> FailureAction {
        self.retry_count += 1;
        if !self.policy.allows_retry(self.retry_count) {
            error!(
                session_id = %self.session_id,
                attempts = self.retry_count,
                error = %err,
                "stream connection retries exhausted"
            );
            self.transition(ConnectionState::ClosedExhausted);
            return FailureAction::Exhausted {
                attempts: self.retry_count,
            };
        }

        let delay = self.policy.delay_for(self.retry_count - 1);
        warn!(
            session_id = %self.session_id,
            attempt = self.retry_count,
            max_attempts = self.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "stream connection lost, retrying"
        );
        self.transition(ConnectionState::ClosedRetrying);
        FailureAction::Retry {
            attempt: self.retry_count,
            delay,
        }
    }

    /// Terminal close. Idempotent, and an exhausted connection stays exhausted.
    pub fn terminate(&mut self) {
        if !self.state.is_closed() {
            self.transition(ConnectionState::ClosedTerminal);
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(session_id = %self.session_id, from = %self.state, to = %next, "connection state");
        self.state = next;
        if self.generation.is_current() {
            self.state_tx.send_replace(next);
        }
    }
}
