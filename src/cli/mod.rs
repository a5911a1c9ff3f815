//! CLI entry point for blockstream.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::error::BlockstreamError;
use crate::types::{BlockUpdate, ContentBlock, StreamCompletion, StreamTarget};

/// Blockstream CLI
#[derive(Parser, Debug)]
#[command(name = "blockstream", version, about = "Watch a streamed assistant message")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a message and print its content blocks as they arrive
    Watch(WatchArgs),
}

/// Arguments for the `watch` subcommand.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Message to stream
    pub message_id: String,

    /// Conversation the message belongs to
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// Streaming endpoint base URL (overrides BLOCKSTREAM_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print updates and the completion as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn target(&self) -> StreamTarget {
        let target = StreamTarget::new(self.message_id.clone());
        match &self.conversation {
            Some(conversation) => target.in_conversation(conversation.clone()),
            None => target,
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Render a published update as one output line.
pub fn render_update(update: &BlockUpdate, as_json: bool) -> Result<String, BlockstreamError> {
    if as_json {
        let line = json!({
            "type": "update",
            "sequence": update.sequence,
            "blocks": serde_json::to_value(&*update.blocks)?,
        });
        return Ok(line.to_string());
    }
    Ok(format!("#{} {}", update.sequence, summarize(&update.blocks)))
}

/// Render the final completion.
pub fn render_completion(
    completion: &StreamCompletion,
    as_json: bool,
) -> Result<String, BlockstreamError> {
    if as_json {
        let line = json!({
            "type": "completion",
            "message_id": completion.message_id,
            "is_error": completion.is_error,
            "reason": serde_json::to_value(&completion.reason)?,
            "session_ref": completion.session_ref,
            "anomalies": serde_json::to_value(&completion.anomalies)?,
            "blocks": serde_json::to_value(&*completion.blocks)?,
            "finished_at": completion.finished_at.to_rfc3339(),
        });
        return Ok(line.to_string());
    }

    let mut out = String::new();
    for block in completion.blocks.iter() {
        out.push_str(&describe(block, usize::MAX));
        out.push('\n');
    }
    for anomaly in &completion.anomalies {
        out.push_str(&format!("warning: {anomaly}\n"));
    }
    match completion.error_message() {
        Some(message) => out.push_str(&format!("failed: {message}")),
        None => out.push_str("done"),
    }
    Ok(out)
}

/// One-line summary of a block sequence.
pub fn summarize(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(|block| describe(block, 40))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn describe(block: &ContentBlock, max_chars: usize) -> String {
    match block {
        ContentBlock::Text { text, .. } => format!("text: {}", clip(text, max_chars)),
        ContentBlock::Reasoning { text, .. } => format!("reasoning: {}", clip(text, max_chars)),
        ContentBlock::ToolInvocation(invocation) => {
            let status = match (&invocation.output, invocation.is_error) {
                (None, _) => "pending",
                (Some(_), false) => "done",
                (Some(_), true) => "error",
            };
            format!("tool {} [{}]", invocation.name, status)
        }
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompletionReason, ToolInvocation};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn blocks() -> Arc<[ContentBlock]> {
        let mut tool = ToolInvocation::new("t1", "search", json!({"q": "rust"}));
        tool.resolve(json!("3 results"), false);
        Arc::from(vec![
            ContentBlock::reasoning("reasoning-1", "Let me check"),
            ContentBlock::ToolInvocation(tool),
            ContentBlock::text("text-2", "Found 3 results"),
        ])
    }

    #[test]
    fn watch_parses_target() {
        let cli = Cli::parse_from(["blockstream", "watch", "msg-1", "-c", "conv-2", "--json"]);
        let Commands::Watch(args) = cli.command;

        assert!(args.json);
        assert_eq!(args.target(), StreamTarget::new("msg-1").in_conversation("conv-2"));
    }

    #[test]
    fn summary_lists_blocks_in_order() {
        assert_eq!(
            summarize(&blocks()),
            "reasoning: Let me check | tool search [done] | text: Found 3 results"
        );
    }

    #[test]
    fn long_text_is_clipped() {
        let text = "a".repeat(50);

        assert_eq!(clip(&text, 40), format!("{}...", "a".repeat(40)));
    }

    #[test]
    fn json_update_carries_sequence_and_blocks() {
        let update = BlockUpdate {
            session_id: Uuid::new_v4(),
            sequence: 4,
            blocks: blocks(),
        };

        let line: serde_json::Value =
            serde_json::from_str(&render_update(&update, true).unwrap()).unwrap();

        assert_eq!(line["sequence"], 4);
        assert_eq!(line["blocks"][1]["type"], "tool_invocation");
        assert_eq!(line["blocks"][1]["output"], "3 results");
    }

    #[test]
    fn failed_completion_reports_reason() {
        let completion = StreamCompletion {
            session_id: Uuid::new_v4(),
            message_id: "msg-1".into(),
            is_error: true,
            reason: CompletionReason::ServerError {
                message: "quota exceeded".into(),
            },
            blocks: blocks(),
            session_ref: None,
            anomalies: Vec::new(),
            finished_at: Utc::now(),
        };

        let text = render_completion(&completion, false).unwrap();

        assert!(text.ends_with("failed: quota exceeded"));
        assert!(text.starts_with("reasoning: Let me check\n"));
    }
}
