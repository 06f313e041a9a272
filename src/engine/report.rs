// src/engine/report.rs

//! Values the engine hands back to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::snapshot::ProgressSnapshot;
use crate::types::{ExecutionId, ExecutionStatus};

/// Returned by `submit`. The execution is running by the time the caller
/// sees this.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub execution_id: ExecutionId,
    pub submitted_at: DateTime<Utc>,
    pub estimated_duration_minutes: u64,
    pub status: ExecutionStatus,
    pub message: String,
}

/// Full status of one execution, live or archived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub percentage: f64,
    pub phase: String,
    pub message: String,

    pub waiting_users: u64,
    pub active_users: u64,
    pub completed_users: u64,
    pub total_users: u64,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub mean_response_time_ms: f64,
    pub p95_response_time_ms: Option<f64>,
    pub current_rps: f64,

    pub report_path: Option<String>,
    pub error_message: Option<String>,
}

impl StatusReport {
    pub(crate) fn build(
        execution_id: &ExecutionId,
        timestamps: Timestamps,
        snapshot: &ProgressSnapshot,
        live: bool,
    ) -> Self {
        let message = if live {
            format!("Real-time monitoring active - {}", snapshot.status.label())
        } else {
            snapshot.message.clone()
        };

        Self {
            execution_id: execution_id.clone(),
            status: snapshot.status,
            submitted_at: timestamps.submitted_at,
            started_at: timestamps.started_at,
            completed_at: timestamps.completed_at,
            percentage: snapshot.percentage,
            phase: snapshot.status.label().to_string(),
            message,
            waiting_users: snapshot.waiting,
            active_users: snapshot.active,
            completed_users: snapshot.done,
            total_users: snapshot.waiting + snapshot.active + snapshot.done,
            total_requests: snapshot.total_requests,
            successful_requests: snapshot.successful_requests,
            failed_requests: snapshot.failed_requests,
            mean_response_time_ms: snapshot.mean_response_time_ms,
            p95_response_time_ms: snapshot.p95_response_time_ms,
            current_rps: snapshot.current_rps,
            report_path: snapshot.report_path.clone(),
            error_message: snapshot.error_message.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// When an execution was submitted, started and finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    pub active: usize,
    pub archived: usize,
    pub total: usize,
}
