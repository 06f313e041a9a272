// src/engine/launcher.rs

//! Pluggable launcher abstraction.
//!
//! The engine talks to an `ExecutionLauncher` instead of spawning processes
//! itself. `ProcessLauncher` is the production implementation: it assembles
//! the feeder file and command line and starts an [`OutputMonitor`]. Tests
//! can provide a launcher that builds a [`MonitorHandle`] around a scripted
//! progress channel.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::assemble::assemble;
use crate::config::{EngineConfig, ToolConfig};
use crate::engine::EngineEvent;
use crate::errors::Result;
use crate::monitor::{MonitorHandle, MonitorSettings, OutputMonitor};
use crate::submission::SubmissionSpec;
use crate::types::ExecutionId;

/// Starts one execution and hands back its live handle.
///
/// Called from the engine task. On `Err` nothing may be left running and
/// the engine keeps no record of the submission.
pub trait ExecutionLauncher: Send + 'static {
    fn launch(
        &mut self,
        execution_id: &ExecutionId,
        spec: &SubmissionSpec,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<MonitorHandle>;
}

/// Runs the external load tool as a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    tool: ToolConfig,
    log_dir: PathBuf,
    settings: MonitorSettings,
}

impl ProcessLauncher {
    pub fn new(tool: ToolConfig, log_dir: impl Into<PathBuf>, settings: MonitorSettings) -> Self {
        Self {
            tool,
            log_dir: log_dir.into(),
            settings,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.tool.clone(), config.log_dir.clone(), config.monitor)
    }

    fn log_path(&self, execution_id: &ExecutionId) -> PathBuf {
        self.log_dir.join(format!("{}.log", execution_id))
    }
}

impl ExecutionLauncher for ProcessLauncher {
    fn launch(
        &mut self,
        execution_id: &ExecutionId,
        spec: &SubmissionSpec,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<MonitorHandle> {
        let assembly = assemble(spec, &self.tool, execution_id)?;
        debug!(%execution_id, command = %assembly.command, "launching execution");

        let monitor = OutputMonitor::new(execution_id.clone(), self.log_path(execution_id), self.settings);
        match monitor.start_monitoring(&assembly.command, &self.tool.working_dir, events) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                if let Err(rm) = std::fs::remove_file(&assembly.feeder_file) {
                    warn!(%execution_id, error = %rm, "failed to remove feeder file");
                }
                Err(e)
            }
        }
    }
}
