//! Where a run's visible effects go.

use std::path::PathBuf;
use std::time::Duration;

use super::RunStatus;
use crate::bridge::FileOpsReport;
use crate::workflow::{Milestone, MilestoneId, Scope, Step, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Thought,
    Action,
    Observation,
}

impl LogKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Action => "action",
            Self::Observation => "observation",
        }
    }
}

/// One line of a scope's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// Receives every visible update of a run, in event order.
///
/// Scoped calls carry the [`Scope`] they belong to, so an implementation can
/// keep one stream per step or flatten them.
pub trait RunSink {
    fn run_started(&mut self, _workflow: &Workflow) {}

    fn step_status(&mut self, index: usize, step: &Step);

    fn log(&mut self, scope: Scope, entry: &LogEntry);

    /// A milestone was added or changed state.
    fn milestone(&mut self, id: MilestoneId, milestone: &Milestone);

    /// Replace the run's one-line status.
    fn status(&mut self, text: &str);

    fn notice(&mut self, level: NoticeLevel, text: &str);

    /// At least one file from a `file_ops` batch was written.
    fn files_written(&mut self, report: &FileOpsReport);

    fn final_answer(&mut self, answer: &str);

    fn error(&mut self, message: &str);

    fn run_finished(&mut self, status: &RunStatus, elapsed: Duration);
}

/// A sink update, as captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    RunStarted(String),
    StepStatus(usize, Step),
    Log(Scope, LogEntry),
    Milestone(MilestoneId, Milestone),
    Status(String),
    Notice(NoticeLevel, String),
    FilesWritten { count: usize, first: Option<PathBuf> },
    FinalAnswer(String),
    Error(String),
    RunFinished(RunStatus),
}

/// Sink that keeps every update in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded_answer(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            SinkEvent::FinalAnswer(answer) => Some(answer.as_str()),
            _ => None,
        })
    }

    pub fn statuses(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Status(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl RunSink for RecordingSink {
    fn run_started(&mut self, workflow: &Workflow) {
        self.events.push(SinkEvent::RunStarted(workflow.id.clone()));
    }

    fn step_status(&mut self, index: usize, step: &Step) {
        self.events.push(SinkEvent::StepStatus(index, step.clone()));
    }

    fn log(&mut self, scope: Scope, entry: &LogEntry) {
        self.events.push(SinkEvent::Log(scope, entry.clone()));
    }

    fn milestone(&mut self, id: MilestoneId, milestone: &Milestone) {
        self.events.push(SinkEvent::Milestone(id, milestone.clone()));
    }

    fn status(&mut self, text: &str) {
        self.events.push(SinkEvent::Status(text.to_string()));
    }

    fn notice(&mut self, level: NoticeLevel, text: &str) {
        self.events.push(SinkEvent::Notice(level, text.to_string()));
    }

    fn files_written(&mut self, report: &FileOpsReport) {
        self.events.push(SinkEvent::FilesWritten {
            count: report.files_written(),
            first: report.first_file().map(PathBuf::from),
        });
    }

    fn final_answer(&mut self, answer: &str) {
        self.events.push(SinkEvent::FinalAnswer(answer.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.events.push(SinkEvent::Error(message.to_string()));
    }

    fn run_finished(&mut self, status: &RunStatus, _elapsed: Duration) {
        self.events.push(SinkEvent::RunFinished(status.clone()));
    }
}
