//! Update coalescing.
//!
//! Mutations stage an update instead of publishing it. At most one tick is
//! armed at a time; everything staged before it fires collapses into a
//! single publish (last write wins).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::session::GenerationToken;

/// Decides when an armed tick fires.
///
/// Returning `None` means the tick only fires on an explicit flush.
pub trait TickSource: Send + Sync {
    fn next_deadline(&self, now: Instant) -> Option<Instant>;
}

/// Fire a fixed interval after the first staged change (frame-style pacing).
#[derive(Debug, Clone, Copy)]
pub struct IntervalTick(pub Duration);

impl TickSource for IntervalTick {
    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        Some(now + self.0)
    }
}

/// Publish on the driver's next turn, after every mutating frame. No
/// coalescing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateTick;

impl TickSource for ImmediateTick {
    fn next_deadline(&self, now: Instant) -> Option<Instant> {
        Some(now)
    }
}

/// Never fire on a timer; publish only on [`StreamEngine::flush`](crate::engine::StreamEngine::flush)
/// or at completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTick;

impl TickSource for ManualTick {
    fn next_deadline(&self, _now: Instant) -> Option<Instant> {
        None
    }
}

struct ArmedTick {
    deadline: Option<Instant>,
    generation: GenerationToken,
}

/// Tracks the staged update and the single pending tick.
pub struct UpdateScheduler {
    source: Arc<dyn TickSource>,
    armed: Option<ArmedTick>,
    staged: bool,
}

impl fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("armed", &self.armed.as_ref().map(|tick| tick.deadline))
            .field("staged", &self.staged)
            .finish()
    }
}

impl UpdateScheduler {
    pub fn new(source: Arc<dyn TickSource>) -> Self {
        Self {
            source,
            armed: None,
            staged: false,
        }
    }

    /// Stage an update; arms a tick unless one is already pending.
    pub fn stage(&mut self, now: Instant, generation: &GenerationToken) {
        self.staged = true;
        if self.armed.is_none() {
            self.armed = Some(ArmedTick {
                deadline: self.source.next_deadline(now),
                generation: generation.clone(),
            });
        }
    }

    /// When the armed tick should fire, if it runs on a timer.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().and_then(|tick| tick.deadline)
    }

    pub fn is_staged(&self) -> bool {
        self.staged
    }

    /// The armed tick fired. Returns whether a publish is due; a tick armed
    /// under a stale generation publishes nothing.
    pub fn fire(&mut self) -> bool {
        let Some(tick) = self.armed.take() else {
            return false;
        };
        if !tick.generation.is_current() {
            self.staged = false;
            return false;
        }
        std::mem::take(&mut self.staged)
    }

    /// Cancel the pending tick and report whether anything was staged.
    pub fn flush(&mut self) -> bool {
        self.armed = None;
        std::mem::take(&mut self.staged)
    }
}
