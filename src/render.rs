//! Terminal rendering of plans and runs.

use std::fmt::Display;
use std::io::{IsTerminal, Write};
use std::time::Duration;

use crossterm::style::{StyledContent, Stylize};
use crossterm::{cursor, queue, terminal};

use crate::bridge::FileOpsReport;
use crate::run::heuristics::format_elapsed;
use crate::run::{LogEntry, LogKind, NoticeLevel, RunSink, RunStatus};
use crate::workflow::{Milestone, MilestoneId, MilestoneState, Scope, Step, StepStatus, Workflow};

/// Observation text longer than this is cut in the live log.
const MAX_LOG_CHARS: usize = 240;

/// Numbered step list of a plan.
pub fn render_plan(workflow: &Workflow) -> String {
    let mut out = format!("Plan {}", workflow.id);
    if let Some(task) = &workflow.task {
        out.push_str(&format!(": {}", task));
    }
    out.push('\n');
    for (index, step) in workflow.steps.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", index + 1, step.description));
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

fn indent(scope: Scope) -> &'static str {
    match scope {
        Scope::Workflow => "  ",
        Scope::Step(_) => "      ",
    }
}

fn styled_status(status: StepStatus) -> StyledContent<&'static str> {
    match status {
        StepStatus::Pending => status.label().dark_grey(),
        StepStatus::InProgress => status.label().cyan(),
        StepStatus::Cancelling => status.label().yellow(),
        StepStatus::Complete => status.label().green(),
        StepStatus::Cancelled => status.label().dark_yellow(),
    }
}

/// Streams a run to a terminal.
///
/// On an interactive terminal the status line is redrawn in place; other
/// writers only get the final status.
pub struct TerminalSink<W: Write> {
    out: W,
    interactive: bool,
    status_shown: bool,
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        let out = std::io::stdout();
        let interactive = out.is_terminal();
        Self::new(out, interactive)
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, interactive: bool) -> Self {
        Self { out, interactive, status_shown: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn clear_status(&mut self) {
        if self.status_shown {
            let _ = queue!(
                self.out,
                cursor::MoveToColumn(0),
                terminal::Clear(terminal::ClearType::CurrentLine)
            );
            self.status_shown = false;
        }
    }

    fn line(&mut self, text: impl Display) {
        self.clear_status();
        let _ = writeln!(self.out, "{}", text);
        let _ = self.out.flush();
    }
}

impl<W: Write> RunSink for TerminalSink<W> {
    fn run_started(&mut self, workflow: &Workflow) {
        self.line(format!("▶ Running workflow {}", workflow.id).bold());
    }

    fn step_status(&mut self, index: usize, step: &Step) {
        self.line(format!(
            "  [{}] {} · {}",
            index + 1,
            step.description.as_str().bold(),
            styled_status(step.status)
        ));
    }

    fn log(&mut self, scope: Scope, entry: &LogEntry) {
        let text = truncate(entry.text.trim(), MAX_LOG_CHARS);
        let label = match entry.kind {
            LogKind::Thought => entry.kind.label().dark_grey(),
            LogKind::Action => entry.kind.label().cyan(),
            LogKind::Observation => entry.kind.label().magenta(),
        };
        self.line(format!("{}{} {}", indent(scope), label, text));
    }

    fn milestone(&mut self, id: MilestoneId, milestone: &Milestone) {
        let icon = match milestone.state {
            MilestoneState::Pending => milestone.state.icon().yellow(),
            MilestoneState::Success => milestone.state.icon().green(),
            MilestoneState::Fail => milestone.state.icon().red(),
        };
        self.line(format!("{}{} {}", indent(id.scope), icon, milestone.label));
    }

    fn status(&mut self, text: &str) {
        if !self.interactive {
            return;
        }
        self.clear_status();
        let _ = write!(self.out, "{}", text.dark_grey());
        let _ = self.out.flush();
        self.status_shown = true;
    }

    fn notice(&mut self, level: NoticeLevel, text: &str) {
        let time = chrono::Local::now().format("%H:%M:%S");
        let marker = match level {
            NoticeLevel::Info => "ℹ".blue(),
            NoticeLevel::Warning => "⚠".yellow(),
        };
        self.line(format!("  {} [{}] {}", marker, time, text));
    }

    fn files_written(&mut self, report: &FileOpsReport) {
        let count = report.files_written();
        let noun = if count == 1 { "file" } else { "files" };
        let mut text = format!("  Wrote {} {}", count, noun);
        if let Some(first) = report.first_file() {
            text.push_str(&format!(" (open first: {})", first.display()));
        }
        self.line(text.green());
    }

    fn final_answer(&mut self, answer: &str) {
        self.line("");
        self.line("Answer".bold().underlined());
        self.line(answer);
    }

    fn error(&mut self, message: &str) {
        self.line(format!("✗ {}", message).red());
    }

    fn run_finished(&mut self, status: &RunStatus, elapsed: Duration) {
        let summary = format!("Run {} after {}", status, format_elapsed(elapsed));
        let styled = match status {
            RunStatus::Completed => summary.green(),
            RunStatus::Cancelled | RunStatus::CancelledInferred => summary.yellow(),
            RunStatus::EndedWithoutOutput | RunStatus::Failed(_) => summary.red(),
        };
        self.line(styled.bold());
    }
}
