//! Server-sent events transport.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use tracing::debug;

use super::transport::{FrameStream, Transport};
use crate::config::EngineConfig;
use crate::error::BlockstreamError;
use crate::types::{RawFrame, StreamTarget};

/// SSE over HTTP. Reconnects are left to the connection manager, so the
/// event source's own retry is disabled.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl SseTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BlockstreamError> {
        Self::from_config(&EngineConfig::builder().base_url(base_url.into()).build())
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, BlockstreamError> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            BlockstreamError::Configuration("base_url is required for the SSE transport".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
        }
    }

    /// Extra header sent with every connection request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, BlockstreamError> {
        let invalid = |e: &dyn std::fmt::Display| {
            BlockstreamError::InvalidArgument(format!("header {name}: {e}"))
        };
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(&e))?;
        let value = HeaderValue::from_str(value).map_err(|e| invalid(&e))?;
        self.headers.insert(header, value);
        Ok(self)
    }

    pub fn stream_url(&self, target: &StreamTarget) -> String {
        match &target.conversation_id {
            Some(conversation_id) => format!(
                "{}/conversations/{}/messages/{}/stream",
                self.base_url, conversation_id, target.message_id
            ),
            None => format!("{}/messages/{}/stream", self.base_url, target.message_id),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self, target: &StreamTarget) -> Result<FrameStream, BlockstreamError> {
        let url = self.stream_url(target);
        debug!(url = %url, "opening SSE stream");

        let request = self.client.get(&url).headers(self.headers.clone());
        let mut source = EventSource::new(request)
            .map_err(|e| BlockstreamError::transport(format!("cannot open {url}: {e}")))?;
        source.set_retry_policy(Box::new(Never));

        // Surface connect failures from `connect` itself rather than as the
        // first stream item.
        let first = match source.next().await {
            Some(Ok(Event::Open)) => None,
            Some(Ok(Event::Message(message))) => Some(RawFrame::new(message.event, message.data)),
            Some(Err(err)) => {
                source.close();
                return Err(map_error(err));
            }
            None => return Err(BlockstreamError::transport("stream closed before opening")),
        };

        let frames = async_stream::stream! {
            if let Some(frame) = first {
                yield Ok(frame);
            }
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        yield Ok(RawFrame::new(message.event, message.data));
                    }
                    Err(EventSourceError::StreamEnded) => break,
                    Err(err) => {
                        yield Err(map_error(err));
                        break;
                    }
                }
            }
            source.close();
        };
        Ok(Box::pin(frames))
    }
}

fn map_error(err: EventSourceError) -> BlockstreamError {
    match err {
        EventSourceError::Transport(err) => BlockstreamError::Network(err),
        EventSourceError::InvalidStatusCode(status, _) => {
            BlockstreamError::transport(format!("unexpected status {status}"))
        }
        EventSourceError::InvalidContentType(content_type, _) => BlockstreamError::transport(
            format!("unexpected content type {content_type:?}"),
        ),
        EventSourceError::StreamEnded => BlockstreamError::transport("stream ended"),
        other => BlockstreamError::transport(other.to_string()),
    }
}
