// src/submission.rs

//! The test specification callers submit to the engine.
//!
//! ```json
//! {
//!   "base_url": "https://api.example.com",
//!   "endpoints": [
//!     { "name": "List users", "path": "/users", "method": "GET",
//!       "headers": { "Accept": "application/json" } }
//!   ],
//!   "parameters": { "virtual_users": 5, "duration_seconds": 120, "rps": 10.0 },
//!   "headers": { "Authorization": "Bearer ..." },
//!   "assertions": { "fail_pct_lt": 5.0, "p95_lt_ms": 2000 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSpec {
    /// Target the load tool prefixes every endpoint path with.
    pub base_url: String,

    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,

    #[serde(default)]
    pub parameters: TestParameters,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Optional pass/fail thresholds evaluated by the load tool itself.
    #[serde(default)]
    pub assertions: Option<Assertions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(default = "default_endpoint_name")]
    pub name: String,

    #[serde(default = "default_endpoint_path", alias = "url")]
    pub path: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_endpoint_name() -> String {
    "API Request".to_string()
}

fn default_endpoint_path() -> String {
    "/".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestParameters {
    #[serde(default = "default_virtual_users")]
    pub virtual_users: u32,

    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,

    /// Target requests per second.
    #[serde(default = "default_rps")]
    pub rps: f64,
}

fn default_virtual_users() -> u32 {
    1
}

fn default_duration_seconds() -> u64 {
    60
}

fn default_rps() -> f64 {
    1.0
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            virtual_users: default_virtual_users(),
            duration_seconds: default_duration_seconds(),
            rps: default_rps(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Assertions {
    /// Maximum failed-request percentage.
    #[serde(default)]
    pub fail_pct_lt: Option<f64>,

    /// Maximum 95th percentile response time in milliseconds.
    #[serde(default)]
    pub p95_lt_ms: Option<f64>,
}

impl SubmissionSpec {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Whole minutes the run is expected to take, rounded up, at least 1.
    pub fn estimated_duration_minutes(&self) -> u64 {
        self.parameters.duration_seconds.div_ceil(60).max(1)
    }

    /// Structural checks the assembler needs before it can build a command.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url must not be empty"));
        }
        if self.endpoints.is_empty() {
            return Err(invalid("at least one endpoint is required"));
        }
        for (idx, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.method.trim().is_empty() {
                return Err(invalid(format!("endpoint #{idx} ('{}') has an empty method", endpoint.name)));
            }
        }

        let params = &self.parameters;
        if params.virtual_users == 0 {
            return Err(invalid("parameters.virtual_users must be >= 1"));
        }
        if params.duration_seconds == 0 {
            return Err(invalid("parameters.duration_seconds must be >= 1"));
        }
        if !(params.rps.is_finite() && params.rps > 0.0) {
            return Err(invalid(format!("parameters.rps must be > 0 (got {})", params.rps)));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidSubmission(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "base_url": "https://api.example.com",
        "endpoints": [
            { "name": "List users", "path": "/users" },
            { "url": "/orders", "method": "POST", "headers": { "X-Trace": "1" } }
        ],
        "parameters": { "virtual_users": 5, "duration_seconds": 61 }
    }"#;

    #[test]
    fn parses_with_defaults() {
        let spec = SubmissionSpec::from_json_str(SPEC).unwrap();
        assert_eq!(spec.endpoints[0].method, "GET");
        assert_eq!(spec.endpoints[1].name, "API Request");
        assert_eq!(spec.endpoints[1].path, "/orders");
        assert_eq!(spec.parameters.rps, 1.0);
        assert!(spec.assertions.is_none());
        spec.validate().unwrap();
    }

    #[test]
    fn estimate_rounds_up() {
        let mut spec = SubmissionSpec::from_json_str(SPEC).unwrap();
        assert_eq!(spec.estimated_duration_minutes(), 2);
        spec.parameters.duration_seconds = 1;
        assert_eq!(spec.estimated_duration_minutes(), 1);
        spec.parameters.duration_seconds = 120;
        assert_eq!(spec.estimated_duration_minutes(), 2);
    }

    #[test]
    fn rejects_structurally_broken_specs() {
        let mut spec = SubmissionSpec::from_json_str(SPEC).unwrap();
        spec.endpoints.clear();
        match spec.validate() {
            Err(EngineError::InvalidSubmission(msg)) => assert!(msg.contains("endpoint")),
            other => panic!("expected InvalidSubmission, got {other:?}"),
        }

        let mut spec = SubmissionSpec::from_json_str(SPEC).unwrap();
        spec.parameters.rps = 0.0;
        assert!(matches!(spec.validate(), Err(EngineError::InvalidSubmission(_))));

        let mut spec = SubmissionSpec::from_json_str(SPEC).unwrap();
        spec.base_url = "  ".into();
        assert!(matches!(spec.validate(), Err(EngineError::InvalidSubmission(_))));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            SubmissionSpec::from_json_str("{ not json"),
            Err(EngineError::JsonError(_))
        ));
    }
}
