//! Ordered, mutable working sequence of content blocks.

pub mod pairing;

pub use pairing::{PairingResolver, PendingResult, ResultOutcome, StartOutcome};

use std::sync::Arc;

use crate::types::{ContentBlock, ToolInvocation};

/// Builds the block sequence as events arrive.
///
/// Block ids for text and reasoning come from a per-session counter; tool
/// invocations keep the id assigned by the server.
#[derive(Debug, Default)]
pub struct BlockAccumulator {
    blocks: Vec<ContentBlock>,
    /// Id of the text block that the next text delta may extend.
    open_text: Option<String>,
    next_id: u64,
}

impl BlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Immutable copy of the current sequence.
    pub fn snapshot(&self) -> Arc<[ContentBlock]> {
        Arc::from(self.blocks.as_slice())
    }

    /// Append a text delta. Returns `false` for an empty delta.
    pub fn push_text(&mut self, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        if let Some(open_id) = self.open_text.as_deref() {
            if let Some(ContentBlock::Text { id, text }) = self.blocks.last_mut() {
                if id == open_id {
                    text.push_str(delta);
                    return true;
                }
            }
        }
        let id = self.fresh_id("text");
        self.open_text = Some(id.clone());
        self.blocks.push(ContentBlock::Text {
            id,
            text: delta.to_string(),
        });
        true
    }

    /// Accumulate reasoning into the session's single reasoning block,
    /// creating it at the front of the sequence on first sight.
    pub fn push_reasoning(&mut self, delta: &str, signature: Option<&str>) -> bool {
        self.close_text();
        if delta.is_empty() && signature.is_none() {
            return false;
        }
        let position = self.blocks.iter().position(ContentBlock::is_reasoning);
        let index = match position {
            Some(index) => index,
            None => {
                let id = self.fresh_id("reasoning");
                self.blocks.insert(0, ContentBlock::reasoning(id, ""));
                0
            }
        };
        if let ContentBlock::Reasoning {
            text,
            signature: current,
            ..
        } = &mut self.blocks[index]
        {
            text.push_str(delta);
            if let Some(signature) = signature {
                *current = Some(signature.to_string());
            }
        }
        true
    }

    /// Append a tool invocation block. Always ends the open text block.
    pub fn push_invocation(&mut self, invocation: ToolInvocation) {
        self.close_text();
        self.blocks.push(ContentBlock::ToolInvocation(invocation));
    }

    pub fn invocation_mut(&mut self, tool_id: &str) -> Option<&mut ToolInvocation> {
        self.blocks.iter_mut().find_map(|block| match block {
            ContentBlock::ToolInvocation(invocation) if invocation.id == tool_id => {
                Some(invocation)
            }
            _ => None,
        })
    }

    pub fn invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.blocks.iter().filter_map(ContentBlock::as_tool_invocation)
    }

    /// Force the next text delta to start a new block.
    pub fn close_text(&mut self) {
        self.open_text = None;
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.open_text = None;
        self.next_id = 0;
    }

    fn fresh_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{}", self.next_id)
    }
}
