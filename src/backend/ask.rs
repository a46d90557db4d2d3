//! Ask mode: streaming question answering over server-sent events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `/ask/stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), knowledge_type: None, model: None }
    }
}

/// One decoded event of an ask stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AskEvent {
    /// A chunk of answer text
    Content(String),
    /// Sources backing the answer
    Sources(Value),
    /// Progress text
    Status(String),
    /// Any other event type, passed through untouched
    Other { kind: String, data: Value },
}

#[derive(Deserialize)]
struct RawAskEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl AskEvent {
    fn from_raw(raw: RawAskEvent) -> Self {
        let text = |data: Value| match data {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        match raw.kind.as_str() {
            "content" => Self::Content(text(raw.data)),
            "sources" => Self::Sources(raw.data),
            "status" => Self::Status(text(raw.data)),
            _ => Self::Other { kind: raw.kind, data: raw.data },
        }
    }
}

/// Incremental decoder for `data: <json>` lines.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters and events split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AskEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<AskEvent> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(line: &[u8]) -> Option<AskEvent> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data: ")?;
    match serde_json::from_str::<RawAskEvent>(payload) {
        Ok(raw) => Some(AskEvent::from_raw(raw)),
        Err(e) => {
            tracing::warn!(error = %e, line = %payload, "Failed to parse SSE data");
            None
        }
    }
}
