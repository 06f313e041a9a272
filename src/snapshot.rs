// src/snapshot.rs

//! Point-in-time progress of one execution.
//!
//! A [`ProgressSnapshot`] is owned by exactly one output monitor, which folds
//! [`LogEvent`]s into it. Once the status is terminal the snapshot is frozen:
//! every further event is ignored.

use serde::Serialize;

use crate::monitor::patterns::LogEvent;
use crate::types::ExecutionStatus;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProgressSnapshot {
    pub status: ExecutionStatus,
    /// Completion percentage in `0.0..=100.0`; never decreases.
    pub percentage: f64,

    pub waiting: u64,
    pub active: u64,
    pub done: u64,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,

    pub mean_response_time_ms: f64,
    pub p95_response_time_ms: Option<f64>,
    pub current_rps: f64,

    pub message: String,
    pub error_message: Option<String>,
    /// Only set on successful completion.
    pub report_path: Option<String>,
}

/// What folding one event did to the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// A field changed; monitoring continues.
    Updated,
    /// Nothing changed (stale phase, lower percentage, frozen snapshot).
    Ignored,
    /// An `[ERROR]` line that does not end the execution.
    SoftError(String),
    /// The execution finished successfully.
    Completed,
    /// The execution failed; carries the error text.
    Failed(String),
}

impl Applied {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Applied::Completed | Applied::Failed(_))
    }
}

impl ProgressSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold one parsed log event into the snapshot.
    pub fn apply(&mut self, event: LogEvent) -> Applied {
        if self.is_terminal() {
            return Applied::Ignored;
        }

        match event {
            LogEvent::PhaseChanged(phase) => self.advance_to(phase),
            LogEvent::ReportsGenerated(path) => {
                self.message = format!("Report generated: {path}");
                self.report_path = Some(path);
                self.percentage = 100.0;
                self.status = ExecutionStatus::Completed;
                Applied::Completed
            }
            LogEvent::HardFailure(reason) => self.fail(reason),
            LogEvent::ErrorLine { message, fatal } => {
                if fatal {
                    return self.fail(message);
                }
                self.message = format!("Error: {message}");
                self.error_message = Some(message.clone());
                Applied::SoftError(message)
            }
            LogEvent::Progress(pct) => {
                let pct = pct.clamp(0.0, 100.0);
                if pct > self.percentage {
                    self.percentage = pct;
                    Applied::Updated
                } else {
                    Applied::Ignored
                }
            }
            LogEvent::Users {
                waiting,
                active,
                done,
            } => {
                self.waiting = waiting;
                self.active = active;
                self.done = done;
                Applied::Updated
            }
            LogEvent::Requests { total, ok, ko } => {
                self.total_requests = total;
                self.successful_requests = ok;
                self.failed_requests = ko;
                Applied::Updated
            }
            LogEvent::MeanResponseTime(ms) => {
                self.mean_response_time_ms = ms;
                Applied::Updated
            }
            LogEvent::P95ResponseTime(ms) => {
                self.p95_response_time_ms = Some(ms);
                Applied::Updated
            }
            LogEvent::Throughput(rps) => {
                self.current_rps = rps;
                Applied::Updated
            }
        }
    }

    /// Move forward to a non-terminal phase; backwards moves are ignored.
    pub fn advance_to(&mut self, phase: ExecutionStatus) -> Applied {
        if self.is_terminal() || phase.is_terminal() || phase.rank() <= self.status.rank() {
            return Applied::Ignored;
        }
        self.status = phase;
        Applied::Updated
    }

    /// Settle the snapshot from the subprocess exit code.
    ///
    /// A terminal state already reached through the log wins over the code.
    /// `None` means the process was killed by a signal.
    pub fn finish_from_exit(&mut self, code: Option<i32>) -> Applied {
        if self.is_terminal() {
            return Applied::Ignored;
        }
        match code {
            Some(0) => {
                self.status = ExecutionStatus::Completed;
                self.percentage = 100.0;
                self.message = "Load tool exited successfully".to_string();
                Applied::Completed
            }
            Some(code) => self.fail(format!("load tool exited with status {code}")),
            None => self.fail("load tool terminated by signal".to_string()),
        }
    }

    /// Mark the execution cancelled. Returns `false` if it was already terminal.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ExecutionStatus::Cancelled;
        self.message = "Execution cancelled by user".to_string();
        true
    }

    fn fail(&mut self, reason: String) -> Applied {
        self.status = ExecutionStatus::Failed;
        self.message = format!("Error: {reason}");
        self.error_message = Some(reason.clone());
        Applied::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> ProgressSnapshot {
        let mut snap = ProgressSnapshot::new();
        snap.advance_to(ExecutionStatus::Preparing);
        snap.advance_to(ExecutionStatus::Running);
        snap
    }

    #[test]
    fn percentage_never_decreases() {
        let mut snap = running();
        assert_eq!(snap.apply(LogEvent::Progress(40.0)), Applied::Updated);
        assert_eq!(snap.apply(LogEvent::Progress(25.5)), Applied::Ignored);
        assert_eq!(snap.percentage, 40.0);
        snap.apply(LogEvent::Progress(250.0));
        assert_eq!(snap.percentage, 100.0);
    }

    #[test]
    fn phases_only_move_forward() {
        let mut snap = running();
        assert_eq!(
            snap.apply(LogEvent::PhaseChanged(ExecutionStatus::Parsing)),
            Applied::Updated
        );
        assert_eq!(
            snap.apply(LogEvent::PhaseChanged(ExecutionStatus::Running)),
            Applied::Ignored
        );
        assert_eq!(snap.status, ExecutionStatus::Parsing);
    }

    #[test]
    fn reports_generated_completes_and_freezes() {
        let mut snap = running();
        snap.apply(LogEvent::Requests {
            total: 10,
            ok: 9,
            ko: 1,
        });
        let applied = snap.apply(LogEvent::ReportsGenerated(
            "/results/run-1/index.html".to_string(),
        ));
        assert_eq!(applied, Applied::Completed);
        assert_eq!(snap.report_path.as_deref(), Some("/results/run-1/index.html"));
        assert_eq!(snap.percentage, 100.0);

        let frozen = snap.clone();
        assert_eq!(snap.apply(LogEvent::Progress(5.0)), Applied::Ignored);
        assert_eq!(
            snap.apply(LogEvent::HardFailure("late".into())),
            Applied::Ignored
        );
        assert!(!snap.cancel());
        assert_eq!(snap, frozen);
    }

    #[test]
    fn soft_error_keeps_status() {
        let mut snap = running();
        let applied = snap.apply(LogEvent::ErrorLine {
            message: "connection reset".into(),
            fatal: false,
        });
        assert_eq!(applied, Applied::SoftError("connection reset".into()));
        assert_eq!(snap.status, ExecutionStatus::Running);
        assert_eq!(snap.error_message.as_deref(), Some("connection reset"));
    }

    #[test]
    fn fatal_error_fails() {
        let mut snap = running();
        let applied = snap.apply(LogEvent::ErrorLine {
            message: "Simulation failed".into(),
            fatal: true,
        });
        assert!(applied.is_terminal());
        assert_eq!(snap.status, ExecutionStatus::Failed);
    }

    #[test]
    fn exit_code_does_not_override_log_outcome() {
        let mut snap = running();
        snap.apply(LogEvent::HardFailure("BUILD FAILURE".into()));
        assert_eq!(snap.finish_from_exit(Some(0)), Applied::Ignored);
        assert_eq!(snap.status, ExecutionStatus::Failed);

        let mut snap = running();
        assert_eq!(
            snap.finish_from_exit(Some(3)),
            Applied::Failed("load tool exited with status 3".into())
        );
        assert!(snap.error_message.is_some());

        let mut snap = running();
        assert_eq!(snap.finish_from_exit(Some(0)), Applied::Completed);
        assert_eq!(snap.status, ExecutionStatus::Completed);
    }
}
