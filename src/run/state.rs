//! Per-run state, owned by the dispatcher.

use std::collections::BTreeMap;

use tokio::time::Instant;

use super::sink::LogEntry;
use super::CancellationCoordinator;
use crate::workflow::{MilestoneTracker, Scope};

/// Event log lines, workflow-level and per step.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    workflow: Vec<LogEntry>,
    steps: BTreeMap<usize, Vec<LogEntry>>,
}

impl EventLog {
    pub fn ensure_step(&mut self, index: usize) {
        self.steps.entry(index).or_default();
    }

    pub fn push(&mut self, scope: Scope, entry: LogEntry) {
        match scope {
            Scope::Workflow => self.workflow.push(entry),
            Scope::Step(index) => self.steps.entry(index).or_default().push(entry),
        }
    }

    pub fn list(&self, scope: Scope) -> &[LogEntry] {
        match scope {
            Scope::Workflow => &self.workflow,
            Scope::Step(index) => self.steps.get(&index).map_or(&[], Vec::as_slice),
        }
    }

    pub fn len(&self) -> usize {
        self.workflow.len() + self.steps.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything one execution tracks. Created fresh for every run.
#[derive(Debug)]
pub struct RunState {
    pub workflow_id: String,
    pub active: bool,
    pub cancel: CancellationCoordinator,
    pub has_final_answer: bool,
    pub started_at: Instant,
    /// Step receiving scoped events; `None` until the first `step_start`
    pub active_step: Option<usize>,
    pub log: EventLog,
    pub milestones: MilestoneTracker,
    pub final_answer: Option<String>,
}

impl RunState {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            active: true,
            cancel: CancellationCoordinator::new(),
            has_final_answer: false,
            started_at: Instant::now(),
            active_step: None,
            log: EventLog::default(),
            milestones: MilestoneTracker::new(),
            final_answer: None,
        }
    }

    /// Scope that thoughts, actions and milestones attach to right now.
    pub fn active_scope(&self) -> Scope {
        self.active_step.map_or(Scope::Workflow, Scope::Step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::sink::LogKind;

    #[test]
    fn test_active_scope_follows_step() {
        let mut state = RunState::new("wf-1");
        assert_eq!(state.active_scope(), Scope::Workflow);
        state.active_step = Some(2);
        assert_eq!(state.active_scope(), Scope::Step(2));
    }

    #[test]
    fn test_event_log_scopes() {
        let mut log = EventLog::default();
        let entry = |text: &str| LogEntry { kind: LogKind::Thought, text: text.to_string() };
        log.push(Scope::Workflow, entry("plan"));
        log.push(Scope::Step(0), entry("a"));
        log.push(Scope::Step(0), entry("b"));

        assert_eq!(log.list(Scope::Workflow).len(), 1);
        assert_eq!(log.list(Scope::Step(0)).len(), 2);
        assert!(log.list(Scope::Step(5)).is_empty());
        assert_eq!(log.len(), 3);
    }
}
