//! Generation tokens that invalidate deferred work after stop or restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Engine-wide generation counter. Advancing it invalidates every token
/// handed out before.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its token.
    pub fn advance(&self) -> GenerationToken {
        let value = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationToken {
            counter: self.0.clone(),
            value,
        }
    }

    /// Invalidate outstanding tokens without issuing a new one.
    pub fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured by every deferred callback and checked before it touches state.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl GenerationToken {
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.value
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}
