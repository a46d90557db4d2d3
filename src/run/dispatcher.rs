//! The event dispatcher: one run, one channel, events in arrival order.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::heuristics::{
    action_label, action_log_entry, file_marker, format_elapsed, is_failure_observation,
};
use super::sink::{LogEntry, LogKind, NoticeLevel, RunSink};
use super::state::{EventLog, RunState};
use super::{CancelSignal, RunStatus};
use crate::backend::{ChannelError, EventChannel};
use crate::bridge::FileBridge;
use crate::protocol::{AgentEvent, EventDecodeError, OutboundMessage};
use crate::workflow::{MilestoneId, MilestoneState, MilestoneTracker, StepStatus, Workflow};

/// Status line refresh period while a run is active.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What a finished run leaves behind.
#[derive(Debug)]
pub struct RunReport {
    pub workflow: Workflow,
    pub status: RunStatus,
    pub final_answer: Option<String>,
    pub milestones: MilestoneTracker,
    pub log: EventLog,
    pub elapsed: Duration,
}

/// Drives one execution of a confirmed workflow.
///
/// Each event is fully handled, file I/O included, before the next one is
/// read, so a later event always sees the effects of earlier ones. Stop
/// requests are cooperative: they are noticed between events and never
/// interrupt a handler.
pub struct EventDispatcher<'a, S: RunSink> {
    workflow: Workflow,
    state: RunState,
    bridge: &'a mut FileBridge,
    sink: &'a mut S,
}

impl<'a, S: RunSink> EventDispatcher<'a, S> {
    pub fn new(workflow: Workflow, bridge: &'a mut FileBridge, sink: &'a mut S) -> Self {
        let state = RunState::new(workflow.id.clone());
        Self { workflow, state, bridge, sink }
    }

    /// Consume `channel` until a terminal event, closure or transport failure.
    pub async fn run(
        mut self,
        channel: &mut dyn EventChannel,
        mut cancel: CancelSignal,
    ) -> RunReport {
        tracing::info!(
            workflow_id = %self.state.workflow_id,
            steps = self.workflow.total_steps(),
            "Run started"
        );
        self.sink.run_started(&self.workflow);

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.requested() => self.request_cancel(channel).await,

                next = channel.next_event() => match next {
                    Some(Ok(event)) => {
                        let terminal = event.is_terminal();
                        self.handle_event(event, channel).await;
                        if terminal {
                            break;
                        }
                    }
                    Some(Err(ChannelError::Malformed(EventDecodeError::UnknownType(kind)))) => {
                        self.unknown_event(&kind);
                    }
                    Some(Err(err)) => {
                        self.transport_failure(err);
                        break;
                    }
                    None => {
                        tracing::debug!(workflow_id = %self.state.workflow_id, "Event channel closed");
                        break;
                    }
                },

                _ = ticker.tick() => self.tick(),
            }
        }

        channel.close().await;
        self.finish()
    }

    /// Apply one event. Exhaustive over every event kind.
    pub async fn handle_event(&mut self, event: AgentEvent, channel: &mut dyn EventChannel) {
        tracing::debug!(workflow_id = %self.state.workflow_id, kind = event.kind(), "Event");
        match event {
            AgentEvent::StepStart(data) => {
                let index = data.step_index;
                let Some(step) = self.workflow.ensure_step(index, data.step.as_ref()) else {
                    tracing::warn!(
                        workflow_id = %self.state.workflow_id,
                        step_index = index,
                        "Ignoring step_start far beyond the plan"
                    );
                    self.sink.notice(
                        NoticeLevel::Warning,
                        &format!("Ignored start of unknown step {}", index + 1),
                    );
                    return;
                };
                step.status = StepStatus::InProgress;
                self.sink.step_status(index, step);
                self.state.active_step = Some(index);
                self.state.log.ensure_step(index);
                self.state.milestones.ensure_step(index);
            }
            AgentEvent::StepComplete(data) => {
                let index = data.step_index;
                if self.workflow.set_status(index, StepStatus::Complete) {
                    if let Some(step) = self.workflow.step(index) {
                        self.sink.step_status(index, step);
                    }
                } else {
                    tracing::debug!(
                        workflow_id = %self.state.workflow_id,
                        step_index = index,
                        "step_complete for unknown step"
                    );
                }
            }
            AgentEvent::Thought(data) => self.log(LogKind::Thought, data.content),
            AgentEvent::Action(data) => {
                let label = action_label(&data.tool, &data.input);
                self.add_milestone(label, MilestoneState::Pending, Some(data.tool.clone()));
                self.log(LogKind::Action, action_log_entry(&data.tool, &data.input));
            }
            AgentEvent::Observation(data) => {
                let success = data.success.unwrap_or_else(|| !is_failure_observation(&data.content));
                let scope = self.state.active_scope();
                match self.state.milestones.resolve(scope, data.tool.as_deref(), success) {
                    Some(id) => self.emit_milestone(id),
                    None => tracing::debug!(
                        workflow_id = %self.state.workflow_id,
                        "Observation with no pending action"
                    ),
                }
                let marker = file_marker(&data.content).map(|path| format!("Generated file {}", path));
                self.log(LogKind::Observation, data.content);
                if let Some(label) = marker {
                    self.add_milestone(label, MilestoneState::Success, None);
                }
            }
            AgentEvent::FileOps(data) => {
                let report = self.bridge.apply_file_ops(&data.ops).await;
                for rejected in &report.rejected {
                    self.sink.notice(
                        NoticeLevel::Warning,
                        &format!("Rejected write to {}: {}", rejected.path, rejected.reason),
                    );
                }
                for warning in &report.warnings {
                    self.sink.notice(NoticeLevel::Warning, warning);
                }
                if let Some(err) = &report.sync_error {
                    self.sink.notice(NoticeLevel::Warning, &format!("Mirror sync failed: {}", err));
                }
                if report.files_written() > 0 {
                    self.sink.files_written(&report);
                }
            }
            AgentEvent::FileReadRequest(data) => {
                let Some(response) = self.bridge.handle_file_read_request(&data).await else {
                    tracing::debug!("Ignoring file read request without id or path");
                    return;
                };
                let request_id = response.request_id.clone();
                if let Err(e) = channel.send(&OutboundMessage::FileReadResponse(response)).await {
                    tracing::warn!(request_id = %request_id, error = %e, "Failed to send file read response");
                }
            }
            AgentEvent::Complete(data) => {
                let answer = data.text().to_string();
                tracing::info!(workflow_id = %self.state.workflow_id, "Run completed");
                self.state.has_final_answer = true;
                self.state.cancel.complete();
                self.sink.final_answer(&answer);
                self.state.final_answer = Some(answer);
            }
            AgentEvent::Error(data) => {
                tracing::info!(workflow_id = %self.state.workflow_id, error = %data.message, "Run failed");
                self.state.has_final_answer = true;
                self.state.cancel.error(data.message.clone());
                self.sink.error(&data.message);
            }
            AgentEvent::Cancelled(data) => {
                tracing::info!(workflow_id = %self.state.workflow_id, "Run cancelled");
                self.state.cancel.acknowledge();
                self.add_milestone("Task cancelled".to_string(), MilestoneState::Success, None);
                let message = data.message.as_deref().filter(|m| !m.is_empty()).unwrap_or("Cancelled");
                self.sink.notice(NoticeLevel::Info, message);
                self.mark_active_steps(StepStatus::Cancelled);
            }
        }
    }

    /// Handle a stop request. Only the first request does anything.
    async fn request_cancel(&mut self, channel: &mut dyn EventChannel) {
        if !self.state.cancel.request() {
            return;
        }
        tracing::info!(workflow_id = %self.state.workflow_id, "Cancel requested");
        self.sink.status("cancelling…");
        self.mark_active_steps(StepStatus::Cancelling);
        if channel.is_open() {
            if let Err(e) = channel.send(&OutboundMessage::Cancel).await {
                tracing::warn!(workflow_id = %self.state.workflow_id, error = %e, "Failed to send cancel");
            }
        }
    }

    fn tick(&mut self) {
        if !self.state.active || self.state.cancel.is_requested() {
            return;
        }
        let elapsed = format_elapsed(self.state.started_at.elapsed());
        self.sink.status(&format!("running · {}", elapsed));
    }

    /// Event kinds this client does not know are reported and skipped.
    fn unknown_event(&mut self, kind: &str) {
        tracing::warn!(
            workflow_id = %self.state.workflow_id,
            kind = %kind,
            "Ignoring unknown event type"
        );
        self.sink.notice(NoticeLevel::Warning, &format!("Ignored unknown event type '{}'", kind));
    }

    fn transport_failure(&mut self, err: ChannelError) {
        tracing::error!(workflow_id = %self.state.workflow_id, error = %err, "Event channel failed");
        let message = err.to_string();
        self.state.cancel.error(message.clone());
        self.sink.error(&message);
    }

    fn finish(mut self) -> RunReport {
        self.state.active = false;
        let status = self.state.cancel.resolve(self.state.has_final_answer);
        match &status {
            RunStatus::CancelledInferred => {
                tracing::info!(
                    workflow_id = %self.state.workflow_id,
                    "Channel closed after cancel request; treating run as cancelled"
                );
                self.mark_active_steps(StepStatus::Cancelled);
            }
            RunStatus::Cancelled => self.mark_active_steps(StepStatus::Cancelled),
            RunStatus::EndedWithoutOutput => {
                tracing::info!(workflow_id = %self.state.workflow_id, "Channel closed without a final answer");
            }
            RunStatus::Completed | RunStatus::Failed(_) => {}
        }

        let elapsed = self.state.started_at.elapsed();
        self.sink.status(&status.to_string());
        self.sink.run_finished(&status, elapsed);

        RunReport {
            workflow: self.workflow,
            status,
            final_answer: self.state.final_answer,
            milestones: self.state.milestones,
            log: self.state.log,
            elapsed,
        }
    }

    fn log(&mut self, kind: LogKind, text: String) {
        let scope = self.state.active_scope();
        let entry = LogEntry { kind, text };
        self.sink.log(scope, &entry);
        self.state.log.push(scope, entry);
    }

    fn add_milestone(&mut self, label: String, state: MilestoneState, tool: Option<String>) {
        let scope = self.state.active_scope();
        let id = self.state.milestones.add(scope, label, state, tool);
        self.emit_milestone(id);
    }

    fn emit_milestone(&mut self, id: MilestoneId) {
        if let Some(milestone) = self.state.milestones.get(id) {
            self.sink.milestone(id, milestone);
        }
    }

    fn mark_active_steps(&mut self, status: StepStatus) {
        for index in self.workflow.transition_active(status) {
            if let Some(step) = self.workflow.step(index) {
                self.sink.step_status(index, step);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{memory_channel, ScriptedBackend};
    use crate::bridge::WorkspaceMirror;
    use crate::core::MirrorConfig;
    use crate::protocol::{
        ActionData, FileReadRequestData, ObservationData, StepStartData, ThoughtData,
    };
    use crate::run::{cancel_channel, RecordingSink};
    use crate::workflow::{PlanResponse, PlanStep, Scope};
    use serde_json::json;
    use std::sync::Arc;

    fn workflow() -> Workflow {
        let mut workflow = Workflow::from_plan(&PlanResponse {
            workflow_id: "wf-1".to_string(),
            task: None,
            steps: vec![PlanStep::new(1, "write TA"), PlanStep::new(2, "build")],
        });
        workflow.confirm();
        workflow
    }

    fn bridge() -> FileBridge {
        let mirror = WorkspaceMirror::new(Arc::new(ScriptedBackend::new()), MirrorConfig::default());
        FileBridge::new(None, mirror)
    }

    fn action(tool: &str) -> AgentEvent {
        AgentEvent::Action(ActionData { tool: tool.to_string(), input: json!({"path": "a.c"}) })
    }

    fn observation(content: &str, success: Option<bool>) -> AgentEvent {
        AgentEvent::Observation(ObservationData { content: content.to_string(), success, tool: None })
    }

    fn step_start(index: usize) -> AgentEvent {
        AgentEvent::StepStart(StepStartData { step_index: index, step: None })
    }

    async fn run_events(events: Vec<AgentEvent>) -> (RunReport, RecordingSink) {
        let (mut channel, mut remote) = memory_channel();
        for event in &events {
            remote.send_event(event);
        }
        remote.close();

        let mut bridge = bridge();
        let mut sink = RecordingSink::new();
        let (_handle, signal) = cancel_channel();
        let report = EventDispatcher::new(workflow(), &mut bridge, &mut sink)
            .run(&mut channel, signal)
            .await;
        (report, sink)
    }

    #[tokio::test]
    async fn test_explicit_failure_resolves_milestone() {
        let (report, _) =
            run_events(vec![step_start(0), action("file_write"), observation("ok", Some(false))]).await;
        let milestone = &report.milestones.list(Scope::Step(0))[0];
        assert_eq!(milestone.state, MilestoneState::Fail);
    }

    #[tokio::test]
    async fn test_inferred_failure_and_benign_line() {
        let (report, _) = run_events(vec![
            action("make"),
            observation("Task failed: disk full", None),
            action("qemu"),
            observation("ERROR: QEMU System Power off: with GPIO.", None),
        ])
        .await;
        let list = report.milestones.list(Scope::Workflow);
        assert_eq!(list[0].state, MilestoneState::Fail);
        assert_eq!(list[1].state, MilestoneState::Success);
    }

    #[tokio::test]
    async fn test_two_actions_before_observations_resolve_in_order() {
        let (report, _) = run_events(vec![
            action("file_write"),
            action("make"),
            observation("done", Some(true)),
            observation("boom", Some(false)),
        ])
        .await;
        let states: Vec<_> =
            report.milestones.list(Scope::Workflow).iter().map(|m| m.state).collect();
        assert_eq!(states, vec![MilestoneState::Success, MilestoneState::Fail]);
        assert_eq!(report.milestones.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_file_marker_adds_milestone() {
        let (report, _) = run_events(vec![
            action("file_write"),
            observation(r#"{"path": "ta/main.c"}"#, Some(true)),
        ])
        .await;
        let list = report.milestones.list(Scope::Workflow);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].label, "Generated file ta/main.c");
    }

    #[tokio::test]
    async fn test_thoughts_follow_active_step() {
        let (report, _) = run_events(vec![
            AgentEvent::Thought(ThoughtData { content: "before".to_string() }),
            step_start(1),
            AgentEvent::Thought(ThoughtData { content: "during".to_string() }),
        ])
        .await;
        assert_eq!(report.log.list(Scope::Workflow)[0].text, "before");
        assert_eq!(report.log.list(Scope::Step(1))[0].text, "during");
    }

    #[tokio::test]
    async fn test_closed_without_terminal_event() {
        let (report, sink) = run_events(vec![step_start(0)]).await;
        assert_eq!(report.status, RunStatus::EndedWithoutOutput);
        assert!(matches!(sink.events.last(), Some(crate::run::SinkEvent::RunFinished(_))));
    }

    #[tokio::test]
    async fn test_events_after_terminal_are_not_read() {
        let (report, _) = run_events(vec![
            AgentEvent::Error(crate::protocol::ErrorData { message: "boom".to_string() }),
            step_start(0),
        ])
        .await;
        assert_eq!(report.status, RunStatus::Failed("boom".to_string()));
        assert_eq!(report.workflow.steps[0].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_malformed_frame_fails_run() {
        let (mut channel, remote) = memory_channel();
        remote.send_raw(r#"{"type":"step_start","data":{"step_index":"first"}}"#);
        let mut bridge = bridge();
        let mut sink = RecordingSink::new();
        let (_handle, signal) = cancel_channel();

        let report = EventDispatcher::new(workflow(), &mut bridge, &mut sink)
            .run(&mut channel, signal)
            .await;
        assert!(matches!(report.status, RunStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_far_step_indices_do_not_grow_plan() {
        let (report, sink) = run_events(vec![
            AgentEvent::StepComplete(crate::protocol::StepCompleteData { step_index: 200_000 }),
            step_start(1_000_000_000),
            AgentEvent::Thought(ThoughtData { content: "still workflow-level".to_string() }),
        ])
        .await;

        assert_eq!(report.workflow.total_steps(), 2);
        assert_eq!(report.log.list(Scope::Workflow)[0].text, "still workflow-level");
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, crate::run::SinkEvent::Notice(NoticeLevel::Warning, _))));
    }

    #[tokio::test]
    async fn test_step_start_past_plan_appends() {
        let (report, _) = run_events(vec![step_start(2)]).await;
        assert_eq!(report.workflow.total_steps(), 3);
        assert_eq!(report.workflow.steps[2].status, StepStatus::InProgress);
    }

    #[tokio::test]
    async fn test_unknown_event_type_is_skipped() {
        let (mut channel, mut remote) = memory_channel();
        remote.send_raw(r#"{"type":"heartbeat","data":{}}"#);
        remote.send_event(&AgentEvent::Complete(crate::protocol::CompleteData {
            answer: Some("done".to_string()),
            message: None,
        }));
        remote.close();
        let mut bridge = bridge();
        let mut sink = RecordingSink::new();
        let (_handle, signal) = cancel_channel();

        let report = EventDispatcher::new(workflow(), &mut bridge, &mut sink)
            .run(&mut channel, signal)
            .await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.final_answer.as_deref(), Some("done"));
        assert!(sink.events.iter().any(|e| matches!(
            e,
            crate::run::SinkEvent::Notice(NoticeLevel::Warning, text) if text.contains("heartbeat")
        )));
    }

    #[tokio::test]
    async fn test_malformed_read_request_gets_no_response() {
        let (mut channel, mut remote) = memory_channel();
        remote.send_event(&AgentEvent::FileReadRequest(FileReadRequestData {
            request_id: Some("r1".to_string()),
            ..Default::default()
        }));
        remote.close();
        let mut bridge = bridge();
        let mut sink = RecordingSink::new();
        let (_handle, signal) = cancel_channel();

        EventDispatcher::new(workflow(), &mut bridge, &mut sink).run(&mut channel, signal).await;
        assert!(remote.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_updates_elapsed_status() {
        let (mut channel, mut remote) = memory_channel();
        let mut bridge = bridge();
        let mut sink = RecordingSink::new();
        let (_handle, signal) = cancel_channel();

        let closer = async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            remote.close();
        };
        let run = EventDispatcher::new(workflow(), &mut bridge, &mut sink).run(&mut channel, signal);
        let (report, ()) = tokio::join!(run, closer);

        assert_eq!(report.status, RunStatus::EndedWithoutOutput);
        let statuses = sink.statuses();
        assert!(statuses.contains(&"running · 0s"));
        assert!(statuses.contains(&"running · 2s"));
        assert_eq!(statuses.last(), Some(&"ended without output"));
    }
}
