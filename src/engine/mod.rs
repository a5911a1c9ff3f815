//! Public control surface: start and stop sessions, observe updates.

mod driver;

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::connection::{ConnectionManager, ConnectionState, Transport};
use crate::error::BlockstreamError;
use crate::scheduler::{IntervalTick, TickSource, UpdateScheduler};
use crate::session::{CompletionFinalizer, GenerationCounter, StreamSession};
use crate::types::{BlockUpdate, SessionId, StreamCompletion, StreamTarget};

use driver::{Driver, DriverCommand};

/// Receives every coalesced block update.
pub type UpdateSink = Arc<dyn Fn(BlockUpdate) + Send + Sync>;

struct ActiveSession {
    id: SessionId,
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<DriverCommand>,
    handle: JoinHandle<()>,
}

impl ActiveSession {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                error!(session_id = %self.id, "stream driver panicked");
            }
        }
    }
}

/// Reconstructs structured content blocks from a push stream.
///
/// One session runs at a time. Starting a new one tears the previous one
/// down first; its callbacks never fire afterwards.
///
/// ```no_run
/// use std::sync::Arc;
/// use blockstream::prelude::*;
///
/// # async fn demo() -> blockstream::Result<()> {
/// let config = EngineConfig::from_env()?;
/// let transport = SseTransport::from_config(&config)?;
/// let engine = StreamEngine::new(config, Arc::new(transport))
///     .with_update_sink(Arc::new(|update: BlockUpdate| {
///         println!("{} blocks", update.blocks.len());
///     }));
///
/// engine
///     .start("msg-42", |completion| {
///         println!("done, error = {}", completion.is_error);
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamEngine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    tick_source: Arc<dyn TickSource>,
    update_sink: Option<UpdateSink>,
    generation: GenerationCounter,
    active: Mutex<Option<ActiveSession>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    latest_tx: Arc<watch::Sender<Option<BlockUpdate>>>,
}

impl StreamEngine {
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let tick_source: Arc<dyn TickSource> = Arc::new(IntervalTick(config.tick_interval()));
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (latest_tx, _) = watch::channel(None);
        Self {
            config,
            transport,
            tick_source,
            update_sink: None,
            generation: GenerationCounter::new(),
            active: Mutex::new(None),
            state_tx: Arc::new(state_tx),
            latest_tx: Arc::new(latest_tx),
        }
    }

    /// Replace the coalescing tick (defaults to the configured interval).
    pub fn with_tick_source(mut self, source: Arc<dyn TickSource>) -> Self {
        self.tick_source = source;
        self
    }

    pub fn with_update_sink(mut self, sink: UpdateSink) -> Self {
        self.update_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start streaming a message. `on_complete` runs exactly once when the
    /// stream completes, fails, or exhausts its retries, and never after
    /// [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns [`BlockstreamError::InvalidArgument`] for an empty message id.
    pub async fn start<F>(
        &self,
        target: impl Into<StreamTarget>,
        on_complete: F,
    ) -> Result<SessionId, BlockstreamError>
    where
        F: FnOnce(StreamCompletion) + Send + 'static,
    {
        let target = target.into();
        if target.message_id.trim().is_empty() {
            return Err(BlockstreamError::InvalidArgument(
                "message id must not be empty".into(),
            ));
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(session_id = %previous.id, "tearing down previous session");
            self.generation.invalidate();
            previous.shutdown().await;
        }

        let generation = self.generation.advance();
        let session = StreamSession::new(target, generation.clone());
        let session_id = session.id();
        info!(
            session_id = %session_id,
            message_id = %session.target().message_id,
            generation = generation.value(),
            "starting stream session"
        );
        self.latest_tx.send_replace(None);

        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            transport: self.transport.clone(),
            connection: ConnectionManager::new(
                session_id,
                self.config.backoff(),
                generation,
                self.state_tx.clone(),
            ),
            session,
            scheduler: UpdateScheduler::new(self.tick_source.clone()),
            finalizer: CompletionFinalizer::new(Box::new(on_complete)),
            latest: self.latest_tx.clone(),
            update_sink: self.update_sink.clone(),
            cancel: cancel.clone(),
            commands: commands_rx,
        };
        let handle = tokio::spawn(driver.run());

        *active = Some(ActiveSession {
            id: session_id,
            cancel,
            commands: commands_tx,
            handle,
        });
        Ok(session_id)
    }

    /// Tear down the active session immediately. No retry follows and the
    /// completion callback does not fire.
    ///
    /// Returns `true` if a session was still running.
    pub async fn stop(&self) -> bool {
        self.generation.invalidate();
        let previous = self.active.lock().await.take();
        let was_running = match previous {
            Some(session) => {
                let running = !session.handle.is_finished();
                info!(session_id = %session.id, running, "stopping stream session");
                session.shutdown().await;
                running
            }
            None => false,
        };
        self.state_tx.send_replace(ConnectionState::Idle);
        was_running
    }

    /// Stop, then forget the last published snapshot.
    pub async fn reset(&self) {
        self.stop().await;
        self.latest_tx.send_replace(None);
    }

    /// Publish any staged update now instead of waiting for the next tick.
    ///
    /// Returns `false` if no session is running.
    pub async fn flush(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(session) => session.commands.send(DriverCommand::Flush).is_ok(),
            None => false,
        }
    }

    /// Id of the session that is still streaming, if any.
    pub async fn active_session(&self) -> Option<SessionId> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|session| !session.handle.is_finished())
            .map(|session| session.id)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to published block updates. Holds `None` until the first
    /// publish of a session.
    pub fn subscribe(&self) -> watch::Receiver<Option<BlockUpdate>> {
        self.latest_tx.subscribe()
    }

    /// Last published update.
    pub fn latest(&self) -> Option<BlockUpdate> {
        self.latest_tx.borrow().clone()
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            self.generation.invalidate();
            session.cancel.cancel();
        }
    }
}
