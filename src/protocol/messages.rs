//! Outbound messages sent back over the execution channel.

use serde::{Deserialize, Serialize};

/// A message from this client to the running agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ask the agent to stop
    Cancel,
    /// Answer to a `file_read_request`
    FileReadResponse(FileReadResponse),
}

impl OutboundMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"cancel"}"#.to_string())
    }
}

/// Response to a file read request, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReadResponse {
    pub request_id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReadResponse {
    /// A successful read.
    pub fn success(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), ok: true, content: Some(content.into()), error: None }
    }

    /// A failed read with a human-readable reason.
    pub fn failure(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self { request_id: request_id.into(), ok: false, content: None, error: Some(error.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_wire_format() {
        assert_eq!(OutboundMessage::Cancel.to_json(), r#"{"type":"cancel"}"#);
    }

    #[test]
    fn test_file_read_response_wire_format() {
        let json = OutboundMessage::FileReadResponse(FileReadResponse::failure("r1", "denied"))
            .to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "file_read_response");
        assert_eq!(value["data"]["request_id"], "r1");
        assert_eq!(value["data"]["ok"], false);
        assert_eq!(value["data"]["error"], "denied");
        assert!(value["data"].get("content").is_none());
    }
}
