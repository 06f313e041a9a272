// src/monitor/process.rs

//! Spawning and tearing down the load-tool process.

use std::fs::{self, File};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::assemble::ToolCommand;

/// Start the tool with stdout and stderr both appended to `log_path`.
///
/// The log file is created (truncated) before the process starts, so the
/// monitor always finds it. On unix the child leads its own process group,
/// which lets cancellation reach the JVM and anything else the tool forks.
pub fn spawn_tool(command: &ToolCommand, working_dir: &Path, log_path: &Path) -> Result<Child> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {:?}", parent))?;
    }
    let log = File::create(log_path).with_context(|| format!("creating log file {:?}", log_path))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("duplicating handle for log file {:?}", log_path))?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    info!(
        program = %command.program,
        args = ?command.args,
        cwd = ?working_dir,
        log = ?log_path,
        "starting load tool"
    );

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}' in {:?}", command.program, working_dir))?;

    debug!(pid = child.id(), "load tool process started");
    Ok(child)
}

/// Gracefully terminate the tool.
///
/// Sends SIGTERM to the process group, waits up to `grace`, then kills the
/// group. Returns once the child has been reaped (or killing failed).
pub async fn terminate(child: &mut Child, grace: Duration) {
    signal_group(child, Signal::Terminate);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(exit_code = status.code(), "load tool exited after SIGTERM");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "error waiting for load tool after SIGTERM");
        }
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "load tool still running after grace period; killing");
            signal_group(child, Signal::Kill);
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill load tool");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &mut Child, signal: Signal) {
    let Some(pid) = child.id() else {
        return;
    };
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // The child was started with `process_group(0)`, so its pid is the pgid.
    let rc = unsafe { libc::kill(-(pid as i32), signo) };
    if rc != 0 {
        debug!(pid, ?signal, error = %std::io::Error::last_os_error(), "signalling process group failed");
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, signal: Signal) {
    if let Err(e) = child.start_kill() {
        debug!(?signal, error = %e, "terminating load tool failed");
    }
}
