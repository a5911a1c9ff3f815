//! Maps raw inbound frames onto [`StreamEvent`]s.
//!
//! Decoding is a soft boundary: a frame that fails here is logged by the
//! caller and dropped, and the stream carries on.

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::types::{RawFrame, StreamEvent};

pub const MESSAGE_CHUNK: &str = "message_chunk";
pub const THINKING: &str = "thinking";
pub const TOOL_USE: &str = "tool_use";
pub const TOOL_RESULT: &str = "tool_result";
pub const MESSAGE_COMPLETE: &str = "message_complete";
pub const RESULT: &str = "result";
pub const ERROR: &str = "error";
pub const TIMEOUT: &str = "timeout";
pub const HEARTBEAT: &str = "heartbeat";

/// SSE default event name; such frames carry their type inside the payload.
const ENVELOPE: &str = "message";

const DEFAULT_ERROR_MESSAGE: &str = "stream error";
const DEFAULT_TIMEOUT_MESSAGE: &str = "stream timed out";

/// Decode one frame.
pub fn decode(frame: &RawFrame) -> Result<StreamEvent, DecodeError> {
    let name = frame.name.trim();
    if name.is_empty() || name == ENVELOPE {
        return decode_envelope(&frame.data);
    }
    decode_named(name, &frame.data)
}

fn decode_named(name: &str, data: &str) -> Result<StreamEvent, DecodeError> {
    match name {
        HEARTBEAT => Ok(StreamEvent::Heartbeat),
        // Error frames are surfaced even when the body is not JSON.
        ERROR => Ok(StreamEvent::StreamError {
            message: error_message(data).unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
        }),
        TIMEOUT => Ok(StreamEvent::StreamError {
            message: error_message(data).unwrap_or_else(|| DEFAULT_TIMEOUT_MESSAGE.to_string()),
        }),
        MESSAGE_COMPLETE | RESULT => {
            if data.trim().is_empty() {
                return Ok(StreamEvent::Completion {
                    is_error: false,
                    session_ref: None,
                });
            }
            let payload = parse_object(name, data)?;
            Ok(completion(&payload))
        }
        MESSAGE_CHUNK | THINKING | TOOL_USE | TOOL_RESULT => {
            let payload = parse_object(name, data)?;
            decode_content(name, &payload)
        }
        other => Err(DecodeError::UnknownFrame(other.to_string())),
    }
}

/// `{"type": "<frame>", "data": {...}}` or a flat `{"type": "<frame>", ...}`.
fn decode_envelope(data: &str) -> Result<StreamEvent, DecodeError> {
    let envelope = parse_object(ENVELOPE, data)?;
    let name = first_str(&envelope, &["type", "event"]).ok_or(DecodeError::MissingField {
        frame: ENVELOPE.to_string(),
        field: "type",
    })?;
    if name == ENVELOPE {
        return Err(DecodeError::UnknownFrame(name.to_string()));
    }
    let inner = match envelope.get("data") {
        Some(Value::Object(inner)) => inner.clone(),
        _ => envelope.clone(),
    };
    match name {
        HEARTBEAT => Ok(StreamEvent::Heartbeat),
        ERROR | TIMEOUT => Ok(StreamEvent::StreamError {
            message: error_field(&inner).unwrap_or_else(|| {
                if name == TIMEOUT {
                    DEFAULT_TIMEOUT_MESSAGE.to_string()
                } else {
                    DEFAULT_ERROR_MESSAGE.to_string()
                }
            }),
        }),
        MESSAGE_COMPLETE | RESULT => Ok(completion(&inner)),
        MESSAGE_CHUNK | THINKING | TOOL_USE | TOOL_RESULT => decode_content(name, &inner),
        other => Err(DecodeError::UnknownFrame(other.to_string())),
    }
}

fn decode_content(name: &str, payload: &Map<String, Value>) -> Result<StreamEvent, DecodeError> {
    match name {
        MESSAGE_CHUNK => {
            let text = first_str(payload, &["content_chunk", "text"]).ok_or(
                DecodeError::MissingField {
                    frame: name.to_string(),
                    field: "content_chunk",
                },
            )?;
            Ok(StreamEvent::TextDelta {
                text: text.to_string(),
            })
        }
        THINKING => {
            let text = first_str(payload, &["thinking"]);
            let signature = first_str(payload, &["signature"]).map(str::to_string);
            if text.is_none() && signature.is_none() {
                return Err(DecodeError::MissingField {
                    frame: name.to_string(),
                    field: "thinking",
                });
            }
            Ok(StreamEvent::ReasoningDelta {
                text: text.unwrap_or_default().to_string(),
                signature,
            })
        }
        TOOL_USE => {
            let id = required_id(name, payload)?;
            let tool_name = first_str(payload, &["tool_name", "name"])
                .filter(|n| !n.trim().is_empty())
                .ok_or(DecodeError::MissingField {
                    frame: name.to_string(),
                    field: "tool_name",
                })?;
            Ok(StreamEvent::ToolInvocationStart {
                id,
                name: tool_name.to_string(),
                input: payload.get("input").cloned().unwrap_or(Value::Null),
                active_description: first_str(payload, &["active_description"])
                    .map(str::to_string),
            })
        }
        TOOL_RESULT => Ok(StreamEvent::ToolInvocationResult {
            id: required_id(name, payload)?,
            output: payload.get("output").cloned().unwrap_or(Value::Null),
            is_error: payload
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        other => Err(DecodeError::UnknownFrame(other.to_string())),
    }
}

fn completion(payload: &Map<String, Value>) -> StreamEvent {
    StreamEvent::Completion {
        is_error: payload
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        session_ref: first_str(payload, &["session_id"]).map(str::to_string),
    }
}

fn parse_object(frame: &str, data: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeError::NotAnObject {
            frame: frame.to_string(),
        }),
        Err(source) => Err(DecodeError::InvalidJson {
            frame: frame.to_string(),
            source,
        }),
    }
}

fn required_id(frame: &str, payload: &Map<String, Value>) -> Result<String, DecodeError> {
    first_str(payload, &["tool_id", "id"])
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .ok_or(DecodeError::MissingField {
            frame: frame.to_string(),
            field: "tool_id",
        })
}

/// First key holding a string value.
fn first_str<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
}

fn error_message(data: &str) -> Option<String> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => error_field(&map),
        Ok(Value::String(message)) if !message.is_empty() => Some(message),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

fn error_field(payload: &Map<String, Value>) -> Option<String> {
    match payload.get("error") {
        Some(Value::String(message)) => return Some(message.clone()),
        Some(Value::Object(inner)) => {
            if let Some(message) = inner.get("message").and_then(Value::as_str) {
                return Some(message.to_string());
            }
        }
        _ => {}
    }
    first_str(payload, &["message"]).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(name: &str, payload: Value) -> RawFrame {
        RawFrame::json(name, payload)
    }

    #[test]
    fn message_chunk_accepts_either_field() {
        assert_eq!(
            decode(&frame("message_chunk", json!({"content_chunk": "Hel"}))).unwrap(),
            StreamEvent::TextDelta { text: "Hel".into() }
        );
        assert_eq!(
            decode(&frame("message_chunk", json!({"text": "lo"}))).unwrap(),
            StreamEvent::TextDelta { text: "lo".into() }
        );
    }

    #[test]
    fn thinking_may_carry_only_a_signature() {
        let event = decode(&frame("thinking", json!({"signature": "sig-1"}))).unwrap();

        assert_eq!(
            event,
            StreamEvent::ReasoningDelta {
                text: String::new(),
                signature: Some("sig-1".into()),
            }
        );
    }

    #[test]
    fn tool_use_reads_aliases_and_description() {
        let event = decode(&frame(
            "tool_use",
            json!({
                "id": "t1",
                "name": "search",
                "input": {"query": "rust"},
                "active_description": "Searching the web"
            }),
        ))
        .unwrap();

        assert_eq!(
            event,
            StreamEvent::ToolInvocationStart {
                id: "t1".into(),
                name: "search".into(),
                input: json!({"query": "rust"}),
                active_description: Some("Searching the web".into()),
            }
        );
    }

    #[test]
    fn tool_result_defaults_is_error_to_false() {
        let event = decode(&frame("tool_result", json!({"tool_id": "t1", "output": "ok"}))).unwrap();

        assert_eq!(
            event,
            StreamEvent::ToolInvocationResult {
                id: "t1".into(),
                output: json!("ok"),
                is_error: false,
            }
        );
    }

    #[test]
    fn tool_use_without_id_is_rejected() {
        let err = decode(&frame("tool_use", json!({"name": "search"}))).unwrap_err();

        assert!(matches!(err, DecodeError::MissingField { field: "tool_id", .. }));
    }

    #[test]
    fn completion_frames_map_to_completion() {
        assert_eq!(
            decode(&frame("result", json!({"is_error": true, "session_id": "s-9"}))).unwrap(),
            StreamEvent::Completion {
                is_error: true,
                session_ref: Some("s-9".into()),
            }
        );
        assert_eq!(
            decode(&RawFrame::new("message_complete", "")).unwrap(),
            StreamEvent::Completion {
                is_error: false,
                session_ref: None,
            }
        );
    }

    #[test]
    fn error_frames_tolerate_any_body() {
        assert_eq!(
            decode(&frame("error", json!({"error": "rate limited"}))).unwrap(),
            StreamEvent::StreamError { message: "rate limited".into() }
        );
        assert_eq!(
            decode(&frame("error", json!({"error": {"message": "overloaded"}}))).unwrap(),
            StreamEvent::StreamError { message: "overloaded".into() }
        );
        assert_eq!(
            decode(&RawFrame::new("error", "upstream went away")).unwrap(),
            StreamEvent::StreamError { message: "upstream went away".into() }
        );
        assert_eq!(
            decode(&RawFrame::new("timeout", "")).unwrap(),
            StreamEvent::StreamError { message: "stream timed out".into() }
        );
    }

    #[test]
    fn heartbeat_ignores_payload() {
        assert_eq!(
            decode(&RawFrame::new("heartbeat", "not json")).unwrap(),
            StreamEvent::Heartbeat
        );
    }

    #[test]
    fn envelope_frames_resolve_type_from_payload() {
        let nested = RawFrame::json(
            "message",
            json!({"type": "tool_result", "data": {"id": "t2", "output": "ok"}}),
        );
        let flat = RawFrame::json("", json!({"type": "message_chunk", "text": "hi"}));

        assert_eq!(
            decode(&nested).unwrap(),
            StreamEvent::ToolInvocationResult {
                id: "t2".into(),
                output: json!("ok"),
                is_error: false,
            }
        );
        assert_eq!(decode(&flat).unwrap(), StreamEvent::TextDelta { text: "hi".into() });
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            decode(&RawFrame::new("message_chunk", "{not json")),
            Err(DecodeError::InvalidJson { .. })
        ));
        assert!(matches!(
            decode(&RawFrame::new("tool_result", "[1, 2]")),
            Err(DecodeError::NotAnObject { .. })
        ));
        assert!(matches!(
            decode(&frame("usage", json!({}))),
            Err(DecodeError::UnknownFrame(name)) if name == "usage"
        ));
    }
}
