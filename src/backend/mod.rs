//! Planning backend client.
//!
//! Two transports are involved:
//!
//! - request/response calls (plan, refine, confirm, workspace init/sync)
//! - a bidirectional event channel per workflow run
//!
//! Both sit behind the [`Backend`] trait so the session and dispatcher can be
//! driven against a real server ([`HttpBackend`]) or an in-process double.

mod ask;
mod channel;
mod error;
mod http;
mod knowledge;
mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ask::{AskEvent, AskRequest, SseDecoder};
pub use channel::{memory_channel, EventChannel, MemoryChannel, MemoryRemote, WsChannel};
pub use error::{BackendError, BackendResult, ChannelError};
pub use http::{normalize_base_url, HttpBackend};
pub use knowledge::{
    AddDocumentRequest, Collection, DocumentError, DocumentMetadata, MAX_DOCUMENT_SIZE,
};
pub use scripted::{BackendCall, ScriptedBackend};

pub use crate::workflow::PlanResponse;

/// Body of `plan-init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInitRequest {
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

/// Response of `workspace-init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInitResponse {
    pub workspace_id: String,
}

/// A file pushed to the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    /// Root-relative path with `/` separators
    pub path: String,
    pub content: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl WorkspaceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into(), encoding: default_encoding() }
    }
}

/// Calls the client makes to the planning backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Request a plan for a task.
    async fn plan_init(&self, request: &PlanInitRequest) -> BackendResult<PlanResponse>;

    /// Revise an existing plan.
    async fn plan_refine(&self, workflow_id: &str, instruction: &str)
        -> BackendResult<PlanResponse>;

    /// Approve a plan. The returned acknowledgement body is opaque.
    async fn plan_confirm(&self, workflow_id: &str) -> BackendResult<serde_json::Value>;

    /// Create a remote workspace mirror.
    async fn workspace_init(&self) -> BackendResult<WorkspaceInitResponse>;

    /// Push files into the mirror, overwriting same-path entries.
    async fn workspace_sync(&self, workspace_id: &str, files: &[WorkspaceFile])
        -> BackendResult<()>;

    /// Open the execution channel for a confirmed workflow.
    async fn open_channel(&self, workflow_id: &str) -> Result<Box<dyn EventChannel>, ChannelError>;
}
