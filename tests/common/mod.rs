//! Shared test helpers and a scripted transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use blockstream::connection::{FrameStream, Transport};
use blockstream::engine::UpdateSink;
use blockstream::error::BlockstreamError;
use blockstream::types::*;

/// What one connection attempt does.
pub enum Script {
    /// `connect` fails with a retryable transport error.
    Fail(&'static str),
    /// `connect` fails with a configuration error.
    Reject(&'static str),
    /// Deliver the frames, then close.
    Frames(Vec<RawFrame>),
    /// Deliver the frames, then stay open.
    Hold(Vec<RawFrame>),
}

/// A transport that plays back one script per connection attempt. Once the
/// scripts run out, connections open and stay silent.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    connects: AtomicUsize,
    targets: Mutex<Vec<StreamTarget>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<StreamTarget> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, target: &StreamTarget) -> Result<FrameStream, BlockstreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Fail(reason)) => Err(BlockstreamError::transport(reason)),
            Some(Script::Reject(reason)) => Err(BlockstreamError::Configuration(reason.into())),
            Some(Script::Frames(frames)) => Ok(stream::iter(frames.into_iter().map(Ok)).boxed()),
            Some(Script::Hold(frames)) => Ok(stream::iter(frames.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}

/// Records every published update.
#[derive(Clone, Default)]
pub struct UpdateLog(Arc<Mutex<Vec<BlockUpdate>>>);

impl UpdateLog {
    pub fn sink(&self) -> UpdateSink {
        let log = self.0.clone();
        Arc::new(move |update| log.lock().unwrap().push(update))
    }

    pub fn updates(&self) -> Vec<BlockUpdate> {
        self.0.lock().unwrap().clone()
    }
}

pub fn chunk(text: &str) -> RawFrame {
    RawFrame::json("message_chunk", json!({ "content_chunk": text }))
}

pub fn thinking(text: &str) -> RawFrame {
    RawFrame::json("thinking", json!({ "thinking": text }))
}

pub fn tool_use(id: &str, name: &str, input: Value) -> RawFrame {
    RawFrame::json(
        "tool_use",
        json!({ "tool_id": id, "tool_name": name, "input": input }),
    )
}

pub fn tool_result(id: &str, output: &str) -> RawFrame {
    RawFrame::json("tool_result", json!({ "tool_id": id, "output": output }))
}

pub fn complete() -> RawFrame {
    RawFrame::json("message_complete", json!({ "is_error": false }))
}

pub fn error(message: &str) -> RawFrame {
    RawFrame::json("error", json!({ "error": message }))
}

pub fn heartbeat() -> RawFrame {
    RawFrame::new("heartbeat", "")
}
