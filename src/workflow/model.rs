//! Workflow and step model.
//!
//! A workflow is created from a plan returned by the backend, confirmed by
//! the user, and then mutated only by the event dispatcher while it runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Step identifier as assigned by the backend (string or number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepId {
    /// Numeric ID
    Number(i64),
    /// String ID
    String(String),
}

impl From<i64> for StepId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A step as described by the planning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_steps: Vec<PlanStep>,
}

impl PlanStep {
    pub fn new(id: impl Into<StepId>, description: impl Into<String>) -> Self {
        Self { id: id.into(), description: description.into(), status: None, sub_steps: Vec::new() }
    }
}

/// Response of `plan-init` and `plan-refine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// Execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    /// Cancel requested while the step was running; not yet acknowledged
    Cancelling,
    Complete,
    Cancelled,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl StepStatus {
    /// Whether the step is running or winding down.
    pub fn is_active(self) -> bool {
        matches!(self, Self::InProgress | Self::Cancelling)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Cancelling => "cancelling",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A step owned by a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub description: String,
    pub status: StepStatus,
}

impl Step {
    fn from_plan(step: &PlanStep) -> Self {
        Self { id: step.id.clone(), description: step.description.clone(), status: StepStatus::Pending }
    }

    fn placeholder(index: usize) -> Self {
        Self {
            id: StepId::Number(index as i64 + 1),
            description: format!("Step {}", index + 1),
            status: StepStatus::Pending,
        }
    }
}

/// How far past the known steps a `step_start` may reach.
pub const MAX_STEP_GAP: usize = 32;

/// A multi-step task with a server-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub steps: Vec<Step>,
    pub confirmed: bool,
}

impl Workflow {
    /// Create an unconfirmed workflow from a plan response.
    pub fn from_plan(plan: &PlanResponse) -> Self {
        Self {
            id: plan.workflow_id.clone(),
            task: plan.task.clone(),
            steps: plan.steps.iter().map(Step::from_plan).collect(),
            confirmed: false,
        }
    }

    /// Replace the steps in place after a refinement. The workflow id is kept.
    pub fn replace_steps(&mut self, plan: &PlanResponse) {
        if plan.workflow_id != self.id {
            tracing::warn!(
                workflow_id = %self.id,
                returned = %plan.workflow_id,
                "Refined plan returned a different workflow id; keeping the original"
            );
        }
        self.steps = plan.steps.iter().map(Step::from_plan).collect();
        if plan.task.is_some() {
            self.task = plan.task.clone();
        }
    }

    /// Mark the plan as approved by the user.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Get the step at `index`, creating it if the plan did not include it.
    ///
    /// Steps announced by `step_start` beyond the planned list are appended,
    /// using the announced description when one was sent. Indices more than
    /// [`MAX_STEP_GAP`] past the current list are refused.
    pub fn ensure_step(
        &mut self,
        index: usize,
        announced: Option<&PlanStep>,
    ) -> Option<&mut Step> {
        if index >= self.steps.len() + MAX_STEP_GAP {
            return None;
        }
        while self.steps.len() <= index {
            let next = self.steps.len();
            let step = match announced {
                Some(plan) if next == index => Step::from_plan(plan),
                _ => Step::placeholder(next),
            };
            self.steps.push(step);
        }
        self.steps.get_mut(index)
    }

    /// Set a step's status. Returns false if the step does not exist.
    pub fn set_status(&mut self, index: usize, status: StepStatus) -> bool {
        match self.steps.get_mut(index) {
            Some(step) => {
                step.status = status;
                true
            }
            None => false,
        }
    }

    /// Move every running step to `status`, returning the affected indices.
    pub fn transition_active(&mut self, status: StepStatus) -> Vec<usize> {
        let mut changed = Vec::new();
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.status.is_active() && step.status != status {
                step.status = status;
                changed.push(index);
            }
        }
        changed
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Complete).count()
    }
}
