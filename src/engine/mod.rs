// src/engine/mod.rs

//! Batch execution engine.
//!
//! This module ties together:
//! - the execution registry (active handles and archived snapshots)
//! - the launcher that starts an execution and its output monitor
//! - the runtime loop that reacts to:
//!   - caller requests (submit, status, cancel, list, stats, shutdown)
//!   - monitor events (progress, completion, error)
//!   - settled cancellations
//!
//! The pure registry lives in [`core`]; the async shell is implemented in
//! [`runtime`]; callers hold a cloneable [`BatchEngine`] from [`handle`].

use tokio::sync::oneshot;

use crate::errors::Result;
use crate::monitor::MonitorEvent;
use crate::snapshot::ProgressSnapshot;
use crate::submission::SubmissionSpec;
use crate::types::ExecutionId;

pub mod clock;
pub mod core;
pub mod handle;
pub mod launcher;
pub mod report;
pub mod runtime;

pub use clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
pub use core::{ExecutionRecord, ExecutionState, LiveProgress, Registry};
pub use handle::{BatchEngine, EngineBuilder};
pub use launcher::{ExecutionLauncher, ProcessLauncher};
pub use report::{EngineStats, StatusReport, SubmissionReceipt};
pub use runtime::EngineRuntime;

/// Everything that flows into the engine task.
#[derive(Debug)]
pub enum EngineEvent {
    Submit {
        spec: Box<SubmissionSpec>,
        reply: oneshot::Sender<Result<SubmissionReceipt>>,
    },
    Status {
        id: ExecutionId,
        reply: oneshot::Sender<Result<StatusReport>>,
    },
    Cancel {
        id: ExecutionId,
        reply: oneshot::Sender<bool>,
    },
    List {
        limit: usize,
        reply: oneshot::Sender<Vec<StatusReport>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
    /// Cancel everything that is still active, then stop.
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    /// Sent by an execution's output monitor.
    Monitor(MonitorEvent),
    /// A monitor answered a cancel request with the cancelled snapshot, or
    /// `None` if the execution finished first. `reply` is `None` for cancels
    /// issued by shutdown.
    CancelSettled {
        id: ExecutionId,
        outcome: Option<ProgressSnapshot>,
        reply: Option<oneshot::Sender<bool>>,
    },
}
