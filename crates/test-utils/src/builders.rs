#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use loadbatch::config::{EngineConfig, ToolConfig};
use loadbatch::monitor::MonitorSettings;
use loadbatch::submission::{Assertions, EndpointSpec, SubmissionSpec, TestParameters};

/// Builder for `SubmissionSpec` to simplify test setup.
pub struct SubmissionSpecBuilder {
    spec: SubmissionSpec,
}

impl SubmissionSpecBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            spec: SubmissionSpec {
                base_url: base_url.to_string(),
                endpoints: Vec::new(),
                parameters: TestParameters::default(),
                headers: Default::default(),
                assertions: None,
            },
        }
    }

    pub fn endpoint(mut self, name: &str, path: &str) -> Self {
        self.spec.endpoints.push(EndpointSpec {
            name: name.to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            headers: Default::default(),
        });
        self
    }

    pub fn virtual_users(mut self, vu: u32) -> Self {
        self.spec.parameters.virtual_users = vu;
        self
    }

    pub fn duration_seconds(mut self, secs: u64) -> Self {
        self.spec.parameters.duration_seconds = secs;
        self
    }

    pub fn rps(mut self, rps: f64) -> Self {
        self.spec.parameters.rps = rps;
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.spec.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn assertions(mut self, fail_pct_lt: f64, p95_lt_ms: f64) -> Self {
        self.spec.assertions = Some(Assertions {
            fail_pct_lt: Some(fail_pct_lt),
            p95_lt_ms: Some(p95_lt_ms),
        });
        self
    }

    pub fn build(self) -> SubmissionSpec {
        self.spec
    }
}

/// One endpoint, one user, one second.
pub fn minimal_spec() -> SubmissionSpec {
    SubmissionSpecBuilder::new("http://localhost:8080")
        .endpoint("health", "/health")
        .virtual_users(1)
        .duration_seconds(1)
        .build()
}

/// Builder for an `EngineConfig` whose "load tool" is an `sh -c` script.
///
/// The per-execution `-D` parameters land in the script's `$@`, and the
/// monitor polls fast enough for tests to finish in well under a second.
pub struct ShToolConfigBuilder {
    config: EngineConfig,
}

impl ShToolConfigBuilder {
    pub fn new(root: &Path, script: &str) -> Self {
        Self {
            config: EngineConfig {
                tool: ToolConfig {
                    program: "sh".to_string(),
                    args: vec!["-c".to_string(), script.to_string(), "loadtool".to_string()],
                    working_dir: root.to_path_buf(),
                    feeder_dir: "feeders".into(),
                },
                log_dir: root.join("logs"),
                monitor: MonitorSettings {
                    poll_interval: Duration::from_millis(50),
                    idle_polls: 3,
                    cancel_grace: Duration::from_secs(1),
                },
                history_limit: None,
                record_file: None,
            },
        }
    }

    pub fn idle_polls(mut self, polls: u32) -> Self {
        self.config.monitor.idle_polls = polls;
        self
    }

    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.config.monitor.cancel_grace = grace;
        self
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = Some(limit);
        self
    }

    pub fn record_file(mut self, path: &Path) -> Self {
        self.config.record_file = Some(path.to_path_buf());
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}
