//! Executing a confirmed workflow.
//!
//! [`EventDispatcher`] reads the execution channel and turns each
//! [`AgentEvent`](crate::protocol::AgentEvent) into model updates, file
//! mediation and [`RunSink`] calls. [`CancellationCoordinator`] decides how
//! the run is reported once the channel is done.

mod cancel;
mod dispatcher;
pub mod heuristics;
mod sink;
mod state;

pub use cancel::{
    cancel_channel, CancelHandle, CancelPhase, CancelSignal, CancellationCoordinator, RunStatus,
};
pub use dispatcher::{EventDispatcher, RunReport, TICK_INTERVAL};
pub use sink::{LogEntry, LogKind, NoticeLevel, RecordingSink, RunSink, SinkEvent};
pub use state::{EventLog, RunState};
