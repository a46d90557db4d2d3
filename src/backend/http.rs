//! HTTP implementation of the backend calls.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ask::{AskEvent, AskRequest, SseDecoder};
use super::knowledge::AddDocumentRequest;
use super::channel::{EventChannel, WsChannel};
use super::{
    Backend, BackendError, BackendResult, ChannelError, PlanInitRequest, PlanResponse,
    WorkspaceFile, WorkspaceInitResponse,
};
use crate::core::BackendConfig;

/// Normalize a configured backend URL.
///
/// A bare `host:port` gets an `http://` scheme and trailing slashes are
/// dropped.
pub fn normalize_base_url(raw: &str) -> BackendResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BackendError::NotConfigured);
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    let url = with_scheme.trim_end_matches('/').to_string();

    reqwest::Url::parse(&url).map_err(|_| BackendError::InvalidUrl(raw.to_string()))?;
    Ok(url)
}

/// Backend client over HTTP JSON and WebSocket.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client
    client: reqwest::Client,
    /// Normalized base URL without trailing slash
    base_url: String,
}

impl HttpBackend {
    /// Create a client for `base_url`.
    pub fn new(base_url: &str) -> BackendResult<Self> {
        Ok(Self { client: reqwest::Client::new(), base_url: normalize_base_url(base_url)? })
    }

    /// Create a client from configuration.
    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        let url = config.url.as_deref().ok_or(BackendError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self { client, base_url: normalize_base_url(url)? })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL of the execution channel for a workflow.
    pub fn channel_url(&self, workflow_id: &str) -> String {
        let ws_base = self.base_url.replacen("http", "ws", 1);
        format!("{}/code/execute/{}", ws_base, urlencoding::encode(workflow_id))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: Option<&B>,
    ) -> BackendResult<reqwest::Response> {
        let mut request = self.client.post(self.url(endpoint));
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint = endpoint, status = %status, "Backend call failed");
            return Err(BackendError::Status { endpoint: endpoint.to_string(), status });
        }
        Ok(response)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&B>,
    ) -> BackendResult<T> {
        let response = self.post(endpoint, body).await?;
        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| BackendError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    /// Check whether the backend answers `/health`.
    pub async fn health_check(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// Add a document to the knowledge base.
    pub async fn add_document(&self, request: &AddDocumentRequest) -> BackendResult<()> {
        tracing::debug!(
            source = %request.metadata.source,
            collection = %request.collection,
            bytes = request.content.len(),
            "Adding document"
        );
        self.post("/knowledge/add-document", Some(request)).await?;
        Ok(())
    }

    /// Stream an answer from `/ask/stream`.
    ///
    /// `on_event` sees every decoded event as it arrives; the accumulated
    /// `content` text is returned once the stream ends.
    pub async fn ask_stream(
        &self,
        request: &AskRequest,
        mut on_event: impl FnMut(&AskEvent),
    ) -> BackendResult<String> {
        use futures::StreamExt;

        let response = self.post("/ask/stream", Some(request)).await?;
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut answer = String::new();

        while let Some(chunk) = stream.next().await {
            for event in decoder.push(&chunk?) {
                if let AskEvent::Content(text) = &event {
                    answer.push_str(text);
                }
                on_event(&event);
            }
        }
        for event in decoder.finish() {
            if let AskEvent::Content(text) = &event {
                answer.push_str(text);
            }
            on_event(&event);
        }

        Ok(answer)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn plan_init(&self, request: &PlanInitRequest) -> BackendResult<PlanResponse> {
        self.post_json("/plan/init", Some(request)).await
    }

    async fn plan_refine(
        &self,
        workflow_id: &str,
        instruction: &str,
    ) -> BackendResult<PlanResponse> {
        let body = serde_json::json!({ "workflow_id": workflow_id, "instruction": instruction });
        self.post_json("/plan/refine", Some(&body)).await
    }

    async fn plan_confirm(&self, workflow_id: &str) -> BackendResult<serde_json::Value> {
        let body = serde_json::json!({ "workflow_id": workflow_id });
        self.post_json("/plan/confirm", Some(&body)).await
    }

    async fn workspace_init(&self) -> BackendResult<WorkspaceInitResponse> {
        self.post_json::<serde_json::Value, _>("/workspace/init", None).await
    }

    async fn workspace_sync(
        &self,
        workspace_id: &str,
        files: &[WorkspaceFile],
    ) -> BackendResult<()> {
        let body = serde_json::json!({ "workspace_id": workspace_id, "files": files });
        self.post("/workspace/sync", Some(&body)).await?;
        Ok(())
    }

    async fn open_channel(
        &self,
        workflow_id: &str,
    ) -> Result<Box<dyn EventChannel>, ChannelError> {
        let channel = WsChannel::connect(&self.channel_url(workflow_id)).await?;
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_host() {
        assert_eq!(normalize_base_url("localhost:8000").unwrap(), "http://localhost:8000");
    }

    #[test]
    fn test_normalize_strips_trailing_slashes() {
        assert_eq!(
            normalize_base_url(" https://agent.example.com/api// ").unwrap(),
            "https://agent.example.com/api"
        );
    }

    #[test]
    fn test_normalize_empty_is_not_configured() {
        assert!(matches!(normalize_base_url("  "), Err(BackendError::NotConfigured)));
    }

    #[test]
    fn test_channel_url() {
        let backend = HttpBackend::new("http://127.0.0.1:9000").unwrap();
        assert_eq!(backend.channel_url("wf 1"), "ws://127.0.0.1:9000/code/execute/wf%201");

        let secure = HttpBackend::new("https://agent.example.com").unwrap();
        assert_eq!(secure.channel_url("abc"), "wss://agent.example.com/code/execute/abc");
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = BackendConfig::default();
        assert!(matches!(HttpBackend::from_config(&config), Err(BackendError::NotConfigured)));
    }
}
