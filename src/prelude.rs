//! Convenience re-exports for common use.

pub use crate::config::EngineConfig;
pub use crate::connection::{ConnectionState, SseTransport, Transport};
pub use crate::engine::{StreamEngine, UpdateSink};
pub use crate::error::{BlockstreamError, Result};
pub use crate::scheduler::{ImmediateTick, IntervalTick, ManualTick, TickSource};
pub use crate::types::{
    Anomaly, BlockUpdate, CompletionReason, ContentBlock, RawFrame, StreamCompletion,
    StreamEvent, StreamTarget, ToolInvocation,
};
