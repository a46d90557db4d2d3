//! Wire protocol of the agent execution channel.
//!
//! ## Inbound
//!
//! `step_start`, `step_complete`, `thought`, `action`, `observation`,
//! `file_ops`, `file_read_request`, `complete` / `workflow_complete`,
//! `error`, `cancelled`.
//!
//! ## Outbound
//!
//! `cancel` and `file_read_response`, sent over the same channel that
//! delivered the events.

mod events;
mod messages;

pub use events::{
    ActionData, AgentEvent, CancelledData, CompleteData, ErrorData, EventDecodeError, FileOp,
    FileOpsData, FileReadRequestData, ObservationData, StepCompleteData, StepStartData,
    ThoughtData,
};
pub use messages::{FileReadResponse, OutboundMessage};
