// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::monitor::MonitorSettings;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [tool]
/// program = "./mvnw"
/// args = ["gatling:test", "-Dgatling.simulationClass=example.UniversalSimulation"]
/// working_dir = "tools/gatling"
/// feeder_dir = "src/test/resources"
///
/// [monitor]
/// log_dir = "/tmp/loadbatch"
/// poll_interval = "5s"
/// idle_polls = 6
/// cancel_grace = "2s"
///
/// [engine]
/// history_limit = 500
/// record_file = "executions.jsonl"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawEngineConfig {
    #[serde(default)]
    pub tool: ToolSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub engine: EngineSection,
}

/// `[tool]` section: how to invoke the external load tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the per-execution `-D` parameters.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Where feeder files are written. Relative paths are resolved against
    /// `working_dir`.
    #[serde(default = "default_feeder_dir")]
    pub feeder_dir: PathBuf,
}

fn default_program() -> String {
    "./mvnw".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "gatling:test".to_string(),
        "-Dgatling.simulationClass=example.UniversalSimulation".to_string(),
    ]
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_feeder_dir() -> PathBuf {
    PathBuf::from("src/test/resources")
}

impl Default for ToolSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: default_working_dir(),
            feeder_dir: default_feeder_dir(),
        }
    }
}

/// `[monitor]` section. Durations are strings like `"5s"` or `"250ms"`.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    #[serde(default = "default_idle_polls")]
    pub idle_polls: u32,

    #[serde(default = "default_cancel_grace")]
    pub cancel_grace: String,
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("loadbatch")
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_idle_polls() -> u32 {
    6
}

fn default_cancel_grace() -> String {
    "2s".to_string()
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            poll_interval: default_poll_interval(),
            idle_polls: default_idle_polls(),
            cancel_grace: default_cancel_grace(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineSection {
    /// Maximum number of archived executions kept in memory. Unbounded when
    /// absent.
    #[serde(default)]
    pub history_limit: Option<usize>,

    /// Append one JSON line per submission and terminal transition here.
    #[serde(default)]
    pub record_file: Option<PathBuf>,
}

/// Validated tool invocation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub feeder_dir: PathBuf,
}

impl ToolConfig {
    /// Feeder directory resolved against the working directory.
    pub fn feeder_path(&self) -> PathBuf {
        if self.feeder_dir.is_absolute() {
            self.feeder_dir.clone()
        } else {
            self.working_dir.join(&self.feeder_dir)
        }
    }
}

impl From<ToolSection> for ToolConfig {
    fn from(raw: ToolSection) -> Self {
        Self {
            program: raw.program,
            args: raw.args,
            working_dir: raw.working_dir,
            feeder_dir: raw.feeder_dir,
        }
    }
}

/// Validated configuration used by the rest of the crate.
///
/// Construct it from a [`RawEngineConfig`] via `TryFrom`, which rejects
/// malformed durations and out-of-range values.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub tool: ToolConfig,
    pub log_dir: PathBuf,
    pub monitor: MonitorSettings,
    pub history_limit: Option<usize>,
    pub record_file: Option<PathBuf>,
}

impl EngineConfig {
    pub(crate) fn new_unchecked(
        tool: ToolConfig,
        log_dir: PathBuf,
        monitor: MonitorSettings,
        engine: EngineSection,
    ) -> Self {
        Self {
            tool,
            log_dir,
            monitor,
            history_limit: engine.history_limit,
            record_file: engine.record_file,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool: ToolSection::default().into(),
            log_dir: default_log_dir(),
            monitor: MonitorSettings::default(),
            history_limit: None,
            record_file: None,
        }
    }
}
