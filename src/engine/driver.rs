//! The per-session task: connect, pump frames, back off, finish.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::UpdateSink;
use crate::connection::{ConnectionManager, FailureAction, FrameStream, Transport};
use crate::decoder;
use crate::error::BlockstreamError;
use crate::scheduler::UpdateScheduler;
use crate::session::{Applied, CompletionFinalizer, StreamSession, Terminal};
use crate::types::{Anomaly, BlockUpdate, RawFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverCommand {
    Flush,
}

enum Step {
    Cancelled,
    Command(DriverCommand),
    Tick,
    Frame(Option<Result<RawFrame, BlockstreamError>>),
    Resume,
}

enum Pumped {
    Finished,
    Cancelled,
    Failed(BlockstreamError),
}

pub(crate) struct Driver {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) session: StreamSession,
    pub(crate) connection: ConnectionManager,
    pub(crate) scheduler: UpdateScheduler,
    pub(crate) finalizer: CompletionFinalizer,
    pub(crate) latest: Arc<watch::Sender<Option<BlockUpdate>>>,
    pub(crate) update_sink: Option<UpdateSink>,
    pub(crate) cancel: CancellationToken,
    pub(crate) commands: mpsc::UnboundedReceiver<DriverCommand>,
}

impl Driver {
    pub(crate) async fn run(mut self) {
        loop {
            if self.is_stale() {
                return;
            }
            self.connection.begin_attempt();

            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.transport.connect(self.session.target()) => result,
            };

            let failure = match connected {
                Ok(frames) => {
                    if self.is_stale() {
                        return;
                    }
                    self.connection.opened();
                    match self.pump(frames).await {
                        Pumped::Finished | Pumped::Cancelled => return,
                        Pumped::Failed(err) => err,
                    }
                }
                Err(err) => err,
            };

            if self.is_stale() {
                return;
            }
            if !failure.is_retryable() {
                error!(
                    session_id = %self.session.id(),
                    error = %failure,
                    category = ?failure.category(),
                    "stream connection failed, not retrying"
                );
                self.finish(Terminal::failed(failure.to_string()));
                return;
            }
            match self.connection.transport_failed(&failure) {
                FailureAction::Retry { delay, .. } => {
                    if !self.back_off(delay).await {
                        return;
                    }
                }
                FailureAction::Exhausted { attempts } => {
                    self.finish(Terminal::exhausted(attempts, failure.to_string()));
                    return;
                }
            }
        }
    }

    fn is_stale(&self) -> bool {
        self.cancel.is_cancelled() || !self.session.generation().is_current()
    }

    /// Process frames until the connection ends one way or another.
    async fn pump(&mut self, mut frames: FrameStream) -> Pumped {
        loop {
            if self.is_stale() {
                return Pumped::Cancelled;
            }
            let deadline = self.scheduler.deadline();
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                Some(command) = self.commands.recv() => Step::Command(command),
                _ = tick(deadline) => Step::Tick,
                frame = frames.next() => Step::Frame(frame),
            };

            match step {
                Step::Cancelled => return Pumped::Cancelled,
                Step::Command(command) => self.command(command),
                Step::Tick => self.tick(),
                Step::Frame(Some(Ok(frame))) => {
                    if let Some(terminal) = self.handle_frame(frame) {
                        drop(frames);
                        self.finish(terminal);
                        return Pumped::Finished;
                    }
                }
                Step::Frame(Some(Err(err))) => return Pumped::Failed(err),
                Step::Frame(None) => {
                    return Pumped::Failed(BlockstreamError::transport(
                        "stream closed before completion",
                    ))
                }
                Step::Resume => {}
            }
        }
    }

    /// Wait out a reconnect delay. Staged updates still publish meanwhile.
    /// Returns false if the session was stopped.
    async fn back_off(&mut self, delay: Duration) -> bool {
        let resume_at = Instant::now() + delay;
        loop {
            let deadline = self.scheduler.deadline();
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                Some(command) = self.commands.recv() => Step::Command(command),
                _ = tick(deadline) => Step::Tick,
                _ = sleep_until(resume_at) => Step::Resume,
            };

            match step {
                Step::Cancelled => return false,
                Step::Command(command) => self.command(command),
                Step::Tick => self.tick(),
                Step::Resume => return !self.is_stale(),
                Step::Frame(_) => {}
            }
        }
    }

    fn handle_frame(&mut self, frame: RawFrame) -> Option<Terminal> {
        let event = match decoder::decode(&frame) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    session_id = %self.session.id(),
                    frame = %frame.name,
                    error = %err,
                    "discarding malformed frame"
                );
                self.session.record_anomaly(Anomaly::MalformedFrame {
                    frame: frame.name,
                    reason: err.to_string(),
                });
                return None;
            }
        };

        trace!(session_id = %self.session.id(), event = event.kind(), "stream event");
        self.connection.event_processed();
        match self.session.apply(event) {
            Applied::Mutated => {
                self.scheduler
                    .stage(Instant::now(), self.session.generation());
                None
            }
            Applied::Unchanged => None,
            Applied::Terminal(terminal) => Some(terminal),
        }
    }

    fn command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Flush => {
                if self.scheduler.flush() {
                    self.publish();
                }
            }
        }
    }

    fn tick(&mut self) {
        if self.scheduler.fire() {
            self.publish();
        }
    }

    fn publish(&mut self) {
        if !self.session.generation().is_current() {
            return;
        }
        let update = self.session.next_update();
        trace!(
            session_id = %update.session_id,
            sequence = update.sequence,
            blocks = update.blocks.len(),
            "publishing block update"
        );
        self.latest.send_replace(Some(update.clone()));
        if let Some(sink) = &self.update_sink {
            sink(update);
        }
    }

    /// Flush the staged update, close the connection, and hand the final
    /// blocks to the completion callback.
    fn finish(&mut self, terminal: Terminal) {
        if self.scheduler.flush() {
            self.publish();
        }
        self.connection.terminate();
        info!(
            session_id = %self.session.id(),
            message_id = %self.session.target().message_id,
            is_error = terminal.is_error,
            "stream session finished"
        );
        if !self.finalizer.finalize(&mut self.session, terminal) {
            debug!(session_id = %self.session.id(), "completion not delivered");
        }
    }
}

async fn tick(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) if deadline <= Instant::now() => {}
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
