//! Workflow, step and milestone model.
//!
//! ## Lifecycle
//!
//! - `plan` returns an unconfirmed [`Workflow`]
//! - `refine` replaces its steps in place, keeping the workflow id
//! - `confirm` approves it and starts execution
//!
//! During a run the dispatcher owns the workflow and updates step status
//! from `step_start` / `step_complete` events and cancellation. Progress
//! markers live in a [`MilestoneTracker`].

mod milestone;
mod model;

pub use milestone::{Milestone, MilestoneId, MilestoneState, MilestoneTracker, Scope};
pub use model::{PlanResponse, PlanStep, Step, StepId, StepStatus, Workflow, MAX_STEP_GAP};
