//! A planning session: plan, refine, confirm, execute.
//!
//! Holds at most one workflow. Requesting a new plan discards the previous
//! one. The workspace mirror and its id live for the whole session.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{Backend, BackendError, ChannelError, PlanInitRequest};
use crate::bridge::{FileBridge, WorkspaceMirror};
use crate::core::MirrorConfig;
use crate::run::{CancelSignal, EventDispatcher, RunReport, RunSink};
use crate::workflow::Workflow;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("No plan has been requested")]
    NoPlan,

    #[error("Workflow {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("Workflow {0} has not been confirmed")]
    NotConfirmed(String),
}

pub struct Session {
    backend: Arc<dyn Backend>,
    bridge: FileBridge,
    workflow: Option<Workflow>,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, root: Option<PathBuf>, mirror: MirrorConfig) -> Self {
        let bridge = FileBridge::new(root, WorkspaceMirror::new(backend.clone(), mirror));
        Self { backend, bridge, workflow: None }
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.workflow.as_ref()
    }

    pub fn bridge(&self) -> &FileBridge {
        &self.bridge
    }

    /// Request a plan for `task`, replacing any current workflow.
    ///
    /// The workspace mirror is created first so the planner can see the
    /// project. Without an open project the plan is requested without one.
    pub async fn plan(&mut self, task: &str) -> SessionResult<&Workflow> {
        let workspace_id = match self.bridge.ensure_mirror_ready().await {
            Ok(id) => Some(id),
            Err(BackendError::NoWorkspace) => {
                tracing::warn!("No project open; planning without a workspace mirror");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let request = PlanInitRequest {
            task: task.to_string(),
            workspace_root: self.bridge.root().map(|p| p.display().to_string()),
            workspace_id,
        };
        let plan = self.backend.plan_init(&request).await?;
        tracing::info!(workflow_id = %plan.workflow_id, steps = plan.steps.len(), "Plan received");

        Ok(&*self.workflow.insert(Workflow::from_plan(&plan)))
    }

    /// Revise the current plan in place. The workflow id does not change.
    pub async fn refine(&mut self, instruction: &str) -> SessionResult<&Workflow> {
        let workflow = self.workflow.as_mut().ok_or(SessionError::NoPlan)?;
        if workflow.confirmed {
            return Err(SessionError::AlreadyConfirmed(workflow.id.clone()));
        }

        let plan = self.backend.plan_refine(&workflow.id, instruction).await?;
        workflow.replace_steps(&plan);
        tracing::info!(workflow_id = %workflow.id, steps = workflow.total_steps(), "Plan refined");
        Ok(&*workflow)
    }

    /// Approve the current plan.
    pub async fn confirm(&mut self) -> SessionResult<&Workflow> {
        let workflow = self.workflow.as_mut().ok_or(SessionError::NoPlan)?;
        if !workflow.confirmed {
            self.backend.plan_confirm(&workflow.id).await?;
            workflow.confirm();
            tracing::info!(workflow_id = %workflow.id, "Plan confirmed");
        }
        Ok(&*workflow)
    }

    /// Run the confirmed workflow to its end.
    ///
    /// Failing to open the channel is an error; everything after that,
    /// including transport failures, is reported in the [`RunReport`].
    pub async fn execute<S: RunSink>(
        &mut self,
        sink: &mut S,
        cancel: CancelSignal,
    ) -> SessionResult<RunReport> {
        let workflow = self.workflow.clone().ok_or(SessionError::NoPlan)?;
        if !workflow.confirmed {
            return Err(SessionError::NotConfirmed(workflow.id));
        }

        let mut channel = match self.backend.open_channel(&workflow.id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(workflow_id = %workflow.id, error = %e, "Could not open event channel");
                sink.error(&e.to_string());
                return Err(e.into());
            }
        };

        let report = EventDispatcher::new(workflow, &mut self.bridge, sink)
            .run(channel.as_mut(), cancel)
            .await;
        self.workflow = Some(report.workflow.clone());
        Ok(report)
    }

    /// Confirm the plan and start executing it straight away.
    pub async fn confirm_and_execute<S: RunSink>(
        &mut self,
        sink: &mut S,
        cancel: CancelSignal,
    ) -> SessionResult<RunReport> {
        self.confirm().await?;
        self.execute(sink, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, ScriptedBackend};
    use crate::workflow::PlanStep;
    use tempfile::TempDir;

    fn scripted() -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::new().with_plan(vec![
            PlanStep::new(1, "write TA"),
            PlanStep::new(2, "build"),
        ]))
    }

    #[tokio::test]
    async fn test_plan_initializes_mirror_once() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.c"), "x").unwrap();
        let backend = scripted();
        let mut session =
            Session::new(backend.clone(), Some(temp.path().to_path_buf()), MirrorConfig::default());

        session.plan("first").await.unwrap();
        session.plan("second").await.unwrap();

        assert_eq!(backend.count(|c| matches!(c, BackendCall::WorkspaceInit)), 1);
        let init = backend.calls().into_iter().find_map(|c| match c {
            BackendCall::PlanInit(req) => Some(req),
            _ => None,
        });
        assert_eq!(init.unwrap().workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(session.workflow().unwrap().id, "wf-2");
    }

    #[tokio::test]
    async fn test_plan_without_project() {
        let backend = scripted();
        let mut session = Session::new(backend.clone(), None, MirrorConfig::default());

        let workflow = session.plan("task").await.unwrap();
        assert_eq!(workflow.total_steps(), 2);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::WorkspaceInit)), 0);
    }

    #[tokio::test]
    async fn test_refine_keeps_id_and_stays_unconfirmed() {
        let backend = scripted();
        let mut session = Session::new(backend, None, MirrorConfig::default());
        let id = session.plan("task").await.unwrap().id.clone();

        let workflow = session.refine("add tests").await.unwrap();
        assert_eq!(workflow.id, id);
        assert_eq!(workflow.total_steps(), 3);
        assert!(!workflow.confirmed);
    }

    #[tokio::test]
    async fn test_refine_after_confirm_is_rejected() {
        let mut session = Session::new(scripted(), None, MirrorConfig::default());
        session.plan("task").await.unwrap();
        session.confirm().await.unwrap();
        assert!(matches!(session.refine("x").await, Err(SessionError::AlreadyConfirmed(_))));
    }

    #[tokio::test]
    async fn test_execute_requires_confirmation() {
        let mut session = Session::new(scripted(), None, MirrorConfig::default());
        assert!(matches!(session.refine("x").await, Err(SessionError::NoPlan)));
        session.plan("task").await.unwrap();

        let mut sink = crate::run::RecordingSink::new();
        let (_handle, signal) = crate::run::cancel_channel();
        assert!(matches!(
            session.execute(&mut sink, signal).await,
            Err(SessionError::NotConfirmed(_))
        ));
    }
}
