//! Cancellation coordination and final run status.
//!
//! Per run: `idle -> requested -> {acknowledged | completed | errored}`.
//! Completion and errors can also arrive straight from `idle`. The first
//! terminal phase wins; the channel is not read after it.

use std::fmt;

use tokio::sync::mpsc;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// A final answer arrived
    Completed,
    /// The backend acknowledged the cancel request
    Cancelled,
    /// Cancel was requested and the channel closed without acknowledging it
    CancelledInferred,
    /// The channel closed with no terminal event and no cancel request
    EndedWithoutOutput,
    /// An `error` event or a transport failure
    Failed(String),
}

impl RunStatus {
    /// Whether the CLI should exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::EndedWithoutOutput)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::CancelledInferred)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::CancelledInferred => f.write_str("cancelled (inferred)"),
            Self::EndedWithoutOutput => f.write_str("ended without output"),
            Self::Failed(_) => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelPhase {
    Idle,
    Requested,
    Acknowledged,
    Completed,
    Errored(String),
}

impl CancelPhase {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Completed | Self::Errored(_))
    }
}

#[derive(Debug, Clone)]
pub struct CancellationCoordinator {
    phase: CancelPhase,
    requested: bool,
}

impl Default for CancellationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self { phase: CancelPhase::Idle, requested: false }
    }

    pub fn phase(&self) -> &CancelPhase {
        &self.phase
    }

    /// Whether the user asked to stop at any point in this run.
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Record a stop request. Returns true only for the first request of a
    /// live run; repeats and requests after the run ended are no-ops.
    pub fn request(&mut self) -> bool {
        if self.requested || self.phase.is_terminal() {
            return false;
        }
        self.requested = true;
        self.phase = CancelPhase::Requested;
        true
    }

    /// The backend sent `cancelled`.
    pub fn acknowledge(&mut self) {
        self.requested = true;
        self.finish(CancelPhase::Acknowledged);
    }

    /// The backend sent a final answer.
    pub fn complete(&mut self) {
        self.finish(CancelPhase::Completed);
    }

    /// The run failed.
    pub fn error(&mut self, message: impl Into<String>) {
        self.finish(CancelPhase::Errored(message.into()));
    }

    fn finish(&mut self, phase: CancelPhase) {
        if !self.phase.is_terminal() {
            self.phase = phase;
        }
    }

    /// Final status once the channel is done.
    pub fn resolve(&self, has_final_answer: bool) -> RunStatus {
        match &self.phase {
            CancelPhase::Completed => RunStatus::Completed,
            CancelPhase::Acknowledged => RunStatus::Cancelled,
            CancelPhase::Errored(message) => RunStatus::Failed(message.clone()),
            _ if has_final_answer => RunStatus::Completed,
            CancelPhase::Requested => RunStatus::CancelledInferred,
            CancelPhase::Idle => RunStatus::EndedWithoutOutput,
        }
    }
}

/// Sends stop requests into a running dispatcher. Cheap to clone and usable
/// from any thread, including a signal handler.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl CancelHandle {
    /// Ask the run to stop. Returns false if the run is already over.
    pub fn cancel(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Receiving side of [`CancelHandle`], polled by the dispatcher.
#[derive(Debug)]
pub struct CancelSignal {
    rx: mpsc::UnboundedReceiver<()>,
}

impl CancelSignal {
    /// Wait for the next stop request. Never resolves once every handle is
    /// dropped. Cancel-safe.
    pub async fn requested(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a connected handle/signal pair.
pub fn cancel_channel() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CancelHandle { tx }, CancelSignal { rx })
}
