// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one execution.
///
/// The happy path is
/// `Submitted -> Preparing -> Running -> Parsing -> GeneratingReports -> Completed`.
/// `Failed` can be reached from any non-terminal state through log parsing or
/// a non-zero exit code, and `Cancelled` only through an explicit cancel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Submitted,
    Preparing,
    Running,
    Parsing,
    GeneratingReports,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// `Completed`, `Failed` and `Cancelled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Position along the forward path of the state machine.
    ///
    /// Phase changes parsed from the log are only applied when they move the
    /// execution forward.
    pub fn rank(self) -> u8 {
        match self {
            ExecutionStatus::Submitted => 0,
            ExecutionStatus::Preparing => 1,
            ExecutionStatus::Running => 2,
            ExecutionStatus::Parsing => 3,
            ExecutionStatus::GeneratingReports => 4,
            ExecutionStatus::Completed
            | ExecutionStatus::Failed
            | ExecutionStatus::Cancelled => 5,
        }
    }

    /// Human-readable phase name used in status reports.
    pub fn label(self) -> &'static str {
        match self {
            ExecutionStatus::Submitted => "Submitted",
            ExecutionStatus::Preparing => "Preparing",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Parsing => "Parsing results",
            ExecutionStatus::GeneratingReports => "Generating reports",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Submitted => "submitted",
            ExecutionStatus::Preparing => "preparing",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Parsing => "parsing",
            ExecutionStatus::GeneratingReports => "generating_reports",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "submitted" => Ok(ExecutionStatus::Submitted),
            "preparing" => Ok(ExecutionStatus::Preparing),
            "running" => Ok(ExecutionStatus::Running),
            "parsing" => Ok(ExecutionStatus::Parsing),
            "generating_reports" => Ok(ExecutionStatus::GeneratingReports),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("invalid execution status: {other}")),
        }
    }
}

/// Opaque execution identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used in log lines and file names.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::GeneratingReports.is_terminal());
        assert!(!ExecutionStatus::Submitted.is_terminal());
    }

    #[test]
    fn status_string_forms_agree() {
        for status in [
            ExecutionStatus::Submitted,
            ExecutionStatus::Preparing,
            ExecutionStatus::Running,
            ExecutionStatus::Parsing,
            ExecutionStatus::GeneratingReports,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>(), Ok(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn short_id_truncates() {
        let id = ExecutionId::new("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(ExecutionId::new("abc").short(), "abc");
    }
}
