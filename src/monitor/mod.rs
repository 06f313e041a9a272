// src/monitor/mod.rs

//! Output monitoring for one load-tool process.
//!
//! - [`patterns`] turns single log lines into typed [`LogEvent`]s.
//! - [`tail`] incrementally reads whatever was appended to the log file.
//! - [`process`] spawns the tool with its output redirected to the log file
//!   and tears it down on cancellation.
//! - [`output_monitor`] owns the process and the polling loop, folds events
//!   into the [`ProgressSnapshot`](crate::snapshot::ProgressSnapshot) and
//!   reports back to the engine through [`MonitorEvent`]s.

use std::time::Duration;

use crate::snapshot::ProgressSnapshot;
use crate::types::ExecutionId;

pub mod output_monitor;
pub mod patterns;
pub mod process;
pub mod tail;

pub use output_monitor::{CancelRequest, MonitorHandle, OutputMonitor};
pub use patterns::{LogEvent, Matcher, parse_line};

/// Notifications sent from a monitor's polling task to the engine.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// New log output was processed. Sent once per batch of lines.
    Progress {
        execution_id: ExecutionId,
        snapshot: ProgressSnapshot,
    },
    /// The execution finished successfully; the snapshot is final.
    Completed {
        execution_id: ExecutionId,
        snapshot: ProgressSnapshot,
    },
    /// An error was seen. The execution is over only if the snapshot status
    /// is terminal.
    Error {
        execution_id: ExecutionId,
        message: String,
        snapshot: ProgressSnapshot,
    },
}

/// Timing knobs of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Delay between two reads of the log file.
    pub poll_interval: Duration,
    /// Consecutive polls without growth before the exit code is checked.
    pub idle_polls: u32,
    /// How long a terminated process may take to exit before it is killed.
    pub cancel_grace: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            idle_polls: 6,
            cancel_grace: Duration::from_secs(2),
        }
    }
}
