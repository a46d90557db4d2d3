//! Inbound agent events.
//!
//! Every frame on the execution channel is a JSON object `{type, data}`.
//! Frames are decoded into the closed [`AgentEvent`] type so that the
//! dispatcher matches exhaustively over every kind the backend can send.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::PlanStep;

/// Error decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Malformed event frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for '{kind}' event: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One event from a running agent task.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Free-form reasoning text
    Thought(ThoughtData),
    /// A tool invocation
    Action(ActionData),
    /// A tool result
    Observation(ObservationData),
    /// A plan step became active
    StepStart(StepStartData),
    /// A plan step finished
    StepComplete(StepCompleteData),
    /// Files the agent wants written locally
    FileOps(FileOpsData),
    /// A file the agent wants read from the local tree
    FileReadRequest(FileReadRequestData),
    /// The run finished with a final answer (`complete` or `workflow_complete`)
    Complete(CompleteData),
    /// The backend acknowledged a cancel request
    Cancelled(CancelledData),
    /// The run failed
    Error(ErrorData),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThoughtData {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub tool: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationData {
    pub content: String,
    /// Explicit outcome; when absent the content is inspected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStartData {
    pub step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<PlanStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompleteData {
    pub step_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOpsData {
    pub ops: Vec<FileOp>,
}

/// A single remote-requested file write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOp {
    /// Relative to the project root, or absolute inside it
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_dirs: Option<bool>,
}

impl FileOp {
    /// Create a write of `content` to `path` with default options.
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: Some(content.into()), ..Default::default() }
    }

    /// Content to write; a missing body writes an empty file.
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Declared encoding, defaulting to `utf-8`.
    pub fn encoding(&self) -> &str {
        self.encoding.as_deref().unwrap_or("utf-8")
    }

    /// Whether the declared encoding is one we write faithfully.
    pub fn is_utf8(&self) -> bool {
        matches!(self.encoding().to_ascii_lowercase().as_str(), "utf-8" | "utf8")
    }

    /// Whether parent directories should be created (default true).
    pub fn create_dirs(&self) -> bool {
        self.create_dirs.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileReadRequestData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompleteData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CompleteData {
    /// The final answer, preferring `answer` over `message`.
    pub fn text(&self) -> &str {
        self.answer.as_deref().filter(|a| !a.is_empty()).or(self.message.as_deref()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelledData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorData {
    pub message: String,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl AgentEvent {
    /// Decode a `{type, data}` frame.
    pub fn from_json(text: &str) -> Result<Self, EventDecodeError> {
        let raw: RawEvent = serde_json::from_str(text)?;
        Self::from_parts(&raw.kind, raw.data)
    }

    /// Decode an event from its tag and payload.
    pub fn from_parts(kind: &str, data: Value) -> Result<Self, EventDecodeError> {
        let data = if data.is_null() { Value::Object(serde_json::Map::new()) } else { data };

        fn payload<T: for<'de> Deserialize<'de>>(
            kind: &str,
            data: Value,
        ) -> Result<T, EventDecodeError> {
            serde_json::from_value(data)
                .map_err(|source| EventDecodeError::Payload { kind: kind.to_string(), source })
        }

        let event = match kind {
            "thought" => Self::Thought(payload(kind, data)?),
            "action" => Self::Action(payload(kind, data)?),
            "observation" => Self::Observation(payload(kind, data)?),
            "step_start" => Self::StepStart(payload(kind, data)?),
            "step_complete" => Self::StepComplete(payload(kind, data)?),
            "file_ops" => Self::FileOps(payload(kind, data)?),
            "file_read_request" => Self::FileReadRequest(payload(kind, data)?),
            "complete" | "workflow_complete" => Self::Complete(payload(kind, data)?),
            "cancelled" => Self::Cancelled(payload(kind, data)?),
            "error" => match data {
                Value::String(message) => Self::Error(ErrorData { message }),
                other => Self::Error(payload(kind, other)?),
            },
            other => return Err(EventDecodeError::UnknownType(other.to_string())),
        };
        Ok(event)
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Thought(_) => "thought",
            Self::Action(_) => "action",
            Self::Observation(_) => "observation",
            Self::StepStart(_) => "step_start",
            Self::StepComplete(_) => "step_complete",
            Self::FileOps(_) => "file_ops",
            Self::FileReadRequest(_) => "file_read_request",
            Self::Complete(_) => "complete",
            Self::Cancelled(_) => "cancelled",
            Self::Error(_) => "error",
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Cancelled(_) | Self::Error(_))
    }

    /// Encode back into a `{type, data}` frame.
    pub fn to_json(&self) -> String {
        let data = match self {
            Self::Thought(d) => serde_json::to_value(d),
            Self::Action(d) => serde_json::to_value(d),
            Self::Observation(d) => serde_json::to_value(d),
            Self::StepStart(d) => serde_json::to_value(d),
            Self::StepComplete(d) => serde_json::to_value(d),
            Self::FileOps(d) => serde_json::to_value(d),
            Self::FileReadRequest(d) => serde_json::to_value(d),
            Self::Complete(d) => serde_json::to_value(d),
            Self::Cancelled(d) => serde_json::to_value(d),
            Self::Error(d) => serde_json::to_value(d),
        }
        .unwrap_or(Value::Null);
        serde_json::json!({ "type": self.kind(), "data": data }).to_string()
    }
}
