// src/record.rs

//! Records handed to durable storage on submission and on every terminal
//! transition. The engine never reads them back.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::submission::TestParameters;
use crate::types::{ExecutionId, ExecutionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedExecution {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub base_url: String,
    pub parameters: TestParameters,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

/// Destination for [`PersistedExecution`] records.
///
/// Called from the engine task, so implementations should be quick. Errors
/// are logged by the caller and otherwise ignored.
pub trait RecordSink: Send {
    fn record(&mut self, record: &PersistedExecution) -> Result<()>;
}

/// Emits each record as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl RecordSink for LogSink {
    fn record(&mut self, record: &PersistedExecution) -> Result<()> {
        info!(
            execution_id = %record.execution_id,
            status = %record.status,
            base_url = %record.base_url,
            vu = record.parameters.virtual_users,
            duration_s = record.parameters.duration_seconds,
            submitted_at = %record.submitted_at.to_rfc3339(),
            completed_at = ?record.completed_at.map(|t| t.to_rfc3339()),
            requests = record.total_requests,
            "execution record"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSink for JsonLinesSink {
    fn record(&mut self, record: &PersistedExecution) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serializing execution record")?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating record directory {:?}", parent))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening record file {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("appending to record file {:?}", self.path))?;
        Ok(())
    }
}
