//! Content blocks reconstructed from a response stream.

use serde::{Deserialize, Serialize};

/// One unit of reconstructed output, ordered by first appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Consecutive text deltas.
    Text { id: String, text: String },
    /// Model reasoning; at most one per session.
    Reasoning {
        id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A tool call and, once it arrives, its result.
    ToolInvocation(ToolInvocation),
}

impl ContentBlock {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn reasoning(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Reasoning {
            id: id.into(),
            text: text.into(),
            signature: None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Text { id, .. } | Self::Reasoning { id, .. } => id,
            Self::ToolInvocation(invocation) => &invocation.id,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Self::ToolInvocation(invocation) => Some(invocation),
            _ => None,
        }
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, Self::Reasoning { .. })
    }
}

/// A tool invocation block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
    /// Absent until a result is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub is_error: bool,
    /// Human-readable progress label supplied by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_description: Option<String>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            output: None,
            is_error: false,
            active_description: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.output.is_some()
    }

    /// Set the result. The output is written at most once; returns `false`
    /// when the invocation was already resolved.
    pub fn resolve(&mut self, output: serde_json::Value, is_error: bool) -> bool {
        if self.output.is_some() {
            return false;
        }
        self.output = Some(output);
        self.is_error = is_error;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_sets_output_once() {
        let mut invocation = ToolInvocation::new("t1", "search", json!({"q": "rust"}));

        assert!(invocation.resolve(json!("3 results"), false));
        assert!(!invocation.resolve(json!("other"), true));

        assert_eq!(invocation.output, Some(json!("3 results")));
        assert!(!invocation.is_error);
    }

    #[test]
    fn blocks_serialize_with_type_tag() {
        let block = ContentBlock::ToolInvocation(ToolInvocation::new("t1", "fetch", json!({})));

        let value = serde_json::to_value(&block).unwrap();

        assert_eq!(value["type"], "tool_invocation");
        assert_eq!(value["name"], "fetch");
        assert!(value.get("output").is_none());
    }
}
