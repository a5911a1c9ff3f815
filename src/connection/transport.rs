//! Transport abstraction for the push connection.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BlockstreamError;
use crate::types::{RawFrame, StreamTarget};

/// Frames from one open connection.
///
/// An `Err` item, or the stream ending before a terminal frame, is an
/// abnormal close. Dropping the stream closes the connection.
pub type FrameStream = BoxStream<'static, Result<RawFrame, BlockstreamError>>;

/// Opens push connections for a stream target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection. Resolves once the connection is established.
    async fn connect(&self, target: &StreamTarget) -> Result<FrameStream, BlockstreamError>;
}
