//! In-process backend double.
//!
//! Answers every call from memory and records it, and hands out
//! pre-registered [`MemoryChannel`]s as execution channels. Used to drive
//! sessions without a server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::channel::{EventChannel, MemoryChannel};
use super::{
    Backend, BackendError, BackendResult, ChannelError, PlanInitRequest, PlanResponse,
    WorkspaceFile, WorkspaceInitResponse,
};
use crate::workflow::PlanStep;

/// A call received by a [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    PlanInit(PlanInitRequest),
    PlanRefine { workflow_id: String, instruction: String },
    PlanConfirm(String),
    WorkspaceInit,
    WorkspaceSync { workspace_id: String, files: usize },
    OpenChannel(String),
}

#[derive(Default)]
pub struct ScriptedBackend {
    steps: Mutex<Vec<PlanStep>>,
    calls: Mutex<Vec<BackendCall>>,
    synced: Mutex<Vec<Vec<WorkspaceFile>>>,
    channels: Mutex<VecDeque<MemoryChannel>>,
    plans_issued: AtomicUsize,
    fail_syncs: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps returned by the next `plan_init`.
    pub fn with_plan(self, steps: Vec<PlanStep>) -> Self {
        *lock(&self.steps) = steps;
        self
    }

    /// Queue a channel for the next `open_channel`.
    pub fn push_channel(&self, channel: MemoryChannel) {
        lock(&self.channels).push_back(channel);
    }

    /// Make every `workspace_sync` fail.
    pub fn fail_syncs(&self, fail: bool) {
        self.fail_syncs.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    /// File batches accepted by `workspace_sync`, in call order.
    pub fn sync_batches(&self) -> Vec<Vec<WorkspaceFile>> {
        lock(&self.synced).clone()
    }

    fn record(&self, call: BackendCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn plan_init(&self, request: &PlanInitRequest) -> BackendResult<PlanResponse> {
        self.record(BackendCall::PlanInit(request.clone()));
        let n = self.plans_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PlanResponse {
            workflow_id: format!("wf-{}", n),
            task: Some(request.task.clone()),
            steps: lock(&self.steps).clone(),
        })
    }

    /// Echoes the current plan with the instruction appended as a new step.
    async fn plan_refine(
        &self,
        workflow_id: &str,
        instruction: &str,
    ) -> BackendResult<PlanResponse> {
        self.record(BackendCall::PlanRefine {
            workflow_id: workflow_id.to_string(),
            instruction: instruction.to_string(),
        });
        let mut steps = lock(&self.steps);
        let next_id = steps.len() as i64 + 1;
        steps.push(PlanStep::new(next_id, instruction));
        Ok(PlanResponse { workflow_id: workflow_id.to_string(), task: None, steps: steps.clone() })
    }

    async fn plan_confirm(&self, workflow_id: &str) -> BackendResult<serde_json::Value> {
        self.record(BackendCall::PlanConfirm(workflow_id.to_string()));
        Ok(serde_json::json!({ "status": "confirmed" }))
    }

    async fn workspace_init(&self) -> BackendResult<WorkspaceInitResponse> {
        self.record(BackendCall::WorkspaceInit);
        Ok(WorkspaceInitResponse { workspace_id: "ws-1".to_string() })
    }

    async fn workspace_sync(
        &self,
        workspace_id: &str,
        files: &[WorkspaceFile],
    ) -> BackendResult<()> {
        self.record(BackendCall::WorkspaceSync {
            workspace_id: workspace_id.to_string(),
            files: files.len(),
        });
        if self.fail_syncs.load(Ordering::SeqCst) {
            return Err(BackendError::Other("workspace sync rejected".to_string()));
        }
        lock(&self.synced).push(files.to_vec());
        Ok(())
    }

    async fn open_channel(
        &self,
        workflow_id: &str,
    ) -> Result<Box<dyn EventChannel>, ChannelError> {
        self.record(BackendCall::OpenChannel(workflow_id.to_string()));
        match lock(&self.channels).pop_front() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(ChannelError::Connect(format!("no channel scripted for {}", workflow_id))),
        }
    }
}
