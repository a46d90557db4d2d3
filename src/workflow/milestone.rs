//! Milestones: short progress markers scoped to the workflow or a step.
//!
//! An `action` creates a pending milestone and the matching `observation`
//! resolves it. The protocol normally has at most one action outstanding,
//! but nothing enforces that, so pending milestones are kept in arrival
//! order and resolved oldest-first instead of through a single pointer that
//! a second action would overwrite.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a log entry or milestone is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Workflow-level list, used while no step is active
    Workflow,
    /// List of the step at this index
    Step(usize),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow => f.write_str("workflow"),
            Self::Step(index) => write!(f, "step {}", index + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneState {
    Pending,
    Success,
    Fail,
}

impl MilestoneState {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Fail
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Pending => "…",
            Self::Success => "✓",
            Self::Fail => "✗",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub label: String,
    pub state: MilestoneState,
    /// Tool whose action created this milestone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// Stable handle to a milestone: its scope and position in that scope's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestoneId {
    pub scope: Scope,
    pub index: usize,
}

/// Milestone lists for one run.
#[derive(Debug, Clone, Default)]
pub struct MilestoneTracker {
    workflow: Vec<Milestone>,
    steps: BTreeMap<usize, Vec<Milestone>>,
    pending: VecDeque<MilestoneId>,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the milestone list for a step if it does not exist yet.
    pub fn ensure_step(&mut self, index: usize) {
        self.steps.entry(index).or_default();
    }

    pub fn has_step(&self, index: usize) -> bool {
        self.steps.contains_key(&index)
    }

    fn list_mut(&mut self, scope: Scope) -> &mut Vec<Milestone> {
        match scope {
            Scope::Workflow => &mut self.workflow,
            Scope::Step(index) => self.steps.entry(index).or_default(),
        }
    }

    /// Milestones attached to `scope`.
    pub fn list(&self, scope: Scope) -> &[Milestone] {
        match scope {
            Scope::Workflow => &self.workflow,
            Scope::Step(index) => self.steps.get(&index).map_or(&[], Vec::as_slice),
        }
    }

    pub fn get(&self, id: MilestoneId) -> Option<&Milestone> {
        self.list(id.scope).get(id.index)
    }

    /// Append a milestone. Pending milestones join the resolution queue.
    pub fn add(
        &mut self,
        scope: Scope,
        label: impl Into<String>,
        state: MilestoneState,
        tool: Option<String>,
    ) -> MilestoneId {
        let list = self.list_mut(scope);
        list.push(Milestone { label: label.into(), state, tool });
        let id = MilestoneId { scope, index: list.len() - 1 };
        if state == MilestoneState::Pending {
            self.pending.push_back(id);
        }
        id
    }

    /// Resolve the pending milestone an observation refers to.
    ///
    /// Prefers the oldest pending milestone in `active`, restricted to `tool`
    /// when given; falls back to the oldest pending milestone anywhere
    /// (again tool-restricted first). Returns `None` when nothing is pending.
    pub fn resolve(
        &mut self,
        active: Scope,
        tool: Option<&str>,
        success: bool,
    ) -> Option<MilestoneId> {
        let position = self.find_pending(|id| id.scope == active, tool)
            .or_else(|| self.find_pending(|_| true, tool))?;
        let id = self.pending.remove(position)?;
        if let Some(milestone) = self.list_mut(id.scope).get_mut(id.index) {
            milestone.state = MilestoneState::from_success(success);
        }
        Some(id)
    }

    fn find_pending(&self, scope_ok: impl Fn(&MilestoneId) -> bool, tool: Option<&str>) -> Option<usize> {
        let tool_matches = |id: &MilestoneId| match tool {
            Some(tool) => self.get(*id).and_then(|m| m.tool.as_deref()) == Some(tool),
            None => true,
        };
        self.pending
            .iter()
            .position(|id| scope_ok(id) && tool_matches(id))
            .or_else(|| self.pending.iter().position(|id| scope_ok(id)))
    }

    /// Number of milestones still awaiting an observation.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Every milestone, workflow-level first, then steps in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Scope, &Milestone)> {
        self.workflow.iter().map(|m| (Scope::Workflow, m)).chain(
            self.steps
                .iter()
                .flat_map(|(index, list)| list.iter().map(move |m| (Scope::Step(*index), m))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_action_resolves_last_milestone() {
        let mut tracker = MilestoneTracker::new();
        let id = tracker.add(Scope::Step(0), "Write file a.c", MilestoneState::Pending, None);

        assert_eq!(tracker.resolve(Scope::Step(0), None, false), Some(id));
        assert_eq!(tracker.get(id).unwrap().state, MilestoneState::Fail);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_resolve_with_nothing_pending() {
        let mut tracker = MilestoneTracker::new();
        tracker.add(Scope::Workflow, "Generated file x", MilestoneState::Success, None);
        assert_eq!(tracker.resolve(Scope::Workflow, None, true), None);
    }

    #[test]
    fn test_two_actions_resolve_in_order() {
        let mut tracker = MilestoneTracker::new();
        let first = tracker.add(Scope::Workflow, "first", MilestoneState::Pending, None);
        let second = tracker.add(Scope::Workflow, "second", MilestoneState::Pending, None);

        assert_eq!(tracker.resolve(Scope::Workflow, None, true), Some(first));
        assert_eq!(tracker.resolve(Scope::Workflow, None, false), Some(second));
        assert_eq!(tracker.get(first).unwrap().state, MilestoneState::Success);
        assert_eq!(tracker.get(second).unwrap().state, MilestoneState::Fail);
    }

    #[test]
    fn test_tool_match_takes_priority() {
        let mut tracker = MilestoneTracker::new();
        let read = tracker.add(
            Scope::Workflow,
            "read",
            MilestoneState::Pending,
            Some("file_read".to_string()),
        );
        let write = tracker.add(
            Scope::Workflow,
            "write",
            MilestoneState::Pending,
            Some("file_write".to_string()),
        );

        assert_eq!(tracker.resolve(Scope::Workflow, Some("file_write"), true), Some(write));
        assert_eq!(tracker.resolve(Scope::Workflow, Some("unknown"), true), Some(read));
    }

    #[test]
    fn test_active_scope_preferred() {
        let mut tracker = MilestoneTracker::new();
        let stale = tracker.add(Scope::Step(0), "stale", MilestoneState::Pending, None);
        let current = tracker.add(Scope::Step(1), "current", MilestoneState::Pending, None);

        assert_eq!(tracker.resolve(Scope::Step(1), None, true), Some(current));
        assert_eq!(tracker.get(stale).unwrap().state, MilestoneState::Pending);
        assert_eq!(tracker.resolve(Scope::Step(1), None, true), Some(stale));
    }

    #[test]
    fn test_iter_orders_workflow_first() {
        let mut tracker = MilestoneTracker::new();
        tracker.add(Scope::Step(1), "b", MilestoneState::Success, None);
        tracker.add(Scope::Workflow, "a", MilestoneState::Success, None);
        let labels: Vec<_> = tracker.iter().map(|(_, m)| m.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }
}
