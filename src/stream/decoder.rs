//! Frame decoder for the newline-delimited report protocol
//!
//! Each non-empty frame is a JSON object discriminated by `type`:
//! - `{"type":"chunk","content":"..."}` appends text
//! - `{"type":"status", ...}` is informational
//! - `{"type":"error","content":"..."}` ends the stream with a failure

use serde_json::{Map, Value};
use thiserror::Error;

/// A decoded, validated frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Text to append to the accumulated answer
    Chunk { content: String },
    /// Informational update; every field besides `type`
    Status { fields: Map<String, Value> },
    /// Application-level failure reported by the producer
    Error { content: String },
}

/// A frame that could not be decoded. Recovered locally: the frame is
/// dropped and the stream continues.
#[derive(Error, Debug)]
pub enum DecodeFault {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} message: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },
}

/// Decode a single frame.
///
/// Returns `Ok(None)` for blank frames, which are skipped without being a
/// fault.
pub fn decode(frame: &str) -> Result<Option<Message>, DecodeFault> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Ok(None);
    }

    let mut fields = match serde_json::from_str::<Value>(frame)? {
        Value::Object(map) => map,
        _ => return Err(DecodeFault::NotAnObject),
    };

    let kind = match fields.remove("type") {
        Some(Value::String(kind)) => kind,
        _ => return Err(DecodeFault::MissingType),
    };

    let message = match kind.as_str() {
        "chunk" => Message::Chunk {
            content: take_content(&mut fields, "chunk")?,
        },
        "error" => Message::Error {
            content: take_content(&mut fields, "error")?,
        },
        "status" => Message::Status { fields },
        _ => return Err(DecodeFault::UnknownType(kind)),
    };

    Ok(Some(message))
}

fn take_content(fields: &mut Map<String, Value>, kind: &'static str) -> Result<String, DecodeFault> {
    match fields.remove("content") {
        Some(Value::String(content)) => Ok(content),
        Some(other) => Err(DecodeFault::MalformedPayload {
            kind,
            reason: format!("`content` must be a string, got {}", json_type_name(&other)),
        }),
        None => Err(DecodeFault::MalformedPayload {
            kind,
            reason: "missing `content`".to_string(),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
