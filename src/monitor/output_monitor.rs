// src/monitor/output_monitor.rs

//! The per-execution output monitor.

use std::path::{Path, PathBuf};

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::assemble::ToolCommand;
use crate::engine::EngineEvent;
use crate::errors::{EngineError, Result};
use crate::monitor::patterns::parse_line;
use crate::monitor::process::{spawn_tool, terminate};
use crate::monitor::tail::LogTail;
use crate::monitor::{MonitorEvent, MonitorSettings};
use crate::snapshot::{Applied, ProgressSnapshot};
use crate::types::{ExecutionId, ExecutionStatus};

/// Reply channel for a cancel request: the final `Cancelled` snapshot once
/// the process is confirmed gone, `None` if the execution had already
/// finished on its own.
pub type CancelRequest = oneshot::Sender<Option<ProgressSnapshot>>;

/// Owns one execution's process and log file until monitoring starts.
#[derive(Debug)]
pub struct OutputMonitor {
    execution_id: ExecutionId,
    log_path: PathBuf,
    settings: MonitorSettings,
}

impl OutputMonitor {
    pub fn new(execution_id: ExecutionId, log_path: impl Into<PathBuf>, settings: MonitorSettings) -> Self {
        Self {
            execution_id,
            log_path: log_path.into(),
            settings,
        }
    }

    /// Launch the tool and the background polling task.
    ///
    /// On error nothing is left running: the process either never started or
    /// no task was spawned for it.
    pub fn start_monitoring(
        self,
        command: &ToolCommand,
        working_dir: &Path,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<MonitorHandle> {
        let child = spawn_tool(command, working_dir, &self.log_path)
            .map_err(|e| EngineError::LaunchFailed(format!("{e:#}")))?;

        let mut snapshot = ProgressSnapshot::new();
        snapshot.advance_to(ExecutionStatus::Preparing);
        snapshot.message = "Load tool started".to_string();

        let (progress_tx, progress_rx) = watch::channel(snapshot.clone());
        let (cancel_tx, cancel_rx) = oneshot::channel::<CancelRequest>();

        let tail_loop = TailLoop {
            execution_id: self.execution_id.clone(),
            settings: self.settings,
            child: Some(child),
            tail: LogTail::new(&self.log_path),
            snapshot,
            progress_tx,
            events,
            idle_polls: 0,
        };
        tokio::spawn(tail_loop.run(cancel_rx));

        Ok(MonitorHandle::new(self.execution_id, progress_rx, cancel_tx))
    }
}

/// Engine-side handle to a running monitor.
///
/// The progress channel only ever carries non-terminal snapshots. A terminal
/// snapshot reaches the engine with the event or cancel reply that archives
/// the execution, so a live read never shows a finished state.
#[derive(Debug)]
pub struct MonitorHandle {
    execution_id: ExecutionId,
    progress: watch::Receiver<ProgressSnapshot>,
    cancel: Option<oneshot::Sender<CancelRequest>>,
}

impl MonitorHandle {
    pub fn new(
        execution_id: ExecutionId,
        progress: watch::Receiver<ProgressSnapshot>,
        cancel: oneshot::Sender<CancelRequest>,
    ) -> Self {
        Self {
            execution_id,
            progress,
            cancel: Some(cancel),
        }
    }

    /// Copy of the snapshot the polling task last published.
    pub fn current_progress(&self) -> ProgressSnapshot {
        self.progress.borrow().clone()
    }

    /// Ask the monitor to cancel its execution.
    ///
    /// Returns `None` if a cancel was already requested or the polling task
    /// has stopped; the caller should treat that as a lost cancel.
    pub fn request_cancel(&mut self) -> Option<oneshot::Receiver<Option<ProgressSnapshot>>> {
        let cancel = self.cancel.take()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        match cancel.send(reply_tx) {
            Ok(()) => Some(reply_rx),
            Err(_) => {
                debug!(execution_id = %self.execution_id, "monitor already stopped; cancel not delivered");
                None
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// State of the background polling task. It is the only writer of the
/// execution's snapshot.
struct TailLoop {
    execution_id: ExecutionId,
    settings: MonitorSettings,
    child: Option<Child>,
    tail: LogTail,
    snapshot: ProgressSnapshot,
    progress_tx: watch::Sender<ProgressSnapshot>,
    events: mpsc::Sender<EngineEvent>,
    idle_polls: u32,
}

impl TailLoop {
    async fn run(mut self, mut cancel_rx: oneshot::Receiver<CancelRequest>) {
        info!(execution_id = %self.execution_id, log = ?self.tail.path(), "output monitoring started");

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancel_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.poll().await == Flow::Stop {
                        break;
                    }
                }
                request = &mut cancel_rx, if cancel_open => {
                    match request {
                        Ok(reply) => {
                            let outcome = self.cancel().await;
                            let _ = reply.send(outcome);
                            break;
                        }
                        Err(_) => {
                            // Handle dropped without cancelling; keep going.
                            cancel_open = false;
                        }
                    }
                }
            }
        }

        self.release_child();
        info!(
            execution_id = %self.execution_id,
            status = %self.snapshot.status,
            "output monitoring finished"
        );
    }

    async fn poll(&mut self) -> Flow {
        match self.tail.read_new_lines().await {
            Ok(Some(lines)) => {
                self.idle_polls = 0;
                return self.process_lines(lines).await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(execution_id = %self.execution_id, error = %format!("{e:#}"), "error reading log file");
            }
        }

        self.idle_polls = self.idle_polls.saturating_add(1);
        if self.idle_polls < self.settings.idle_polls {
            return Flow::Continue;
        }

        match self.try_exit_code() {
            Some(code) => {
                self.finish(code).await;
                Flow::Stop
            }
            None => {
                debug!(
                    execution_id = %self.execution_id,
                    idle_polls = self.idle_polls,
                    "log idle but load tool still running"
                );
                Flow::Continue
            }
        }
    }

    /// Feed new lines through the pattern table, then publish once.
    async fn process_lines(&mut self, lines: Vec<String>) -> Flow {
        for line in lines {
            for event in parse_line(&line) {
                match self.snapshot.apply(event) {
                    Applied::SoftError(message) => {
                        warn!(execution_id = %self.execution_id, error = %message, "load tool reported an error");
                        self.publish();
                        self.emit(MonitorEvent::Error {
                            execution_id: self.execution_id.clone(),
                            message,
                            snapshot: self.snapshot.clone(),
                        })
                        .await;
                    }
                    applied if applied.is_terminal() => {
                        self.settle(applied).await;
                        return Flow::Stop;
                    }
                    _ => {}
                }
            }
        }

        self.publish();
        info!(
            execution_id = %self.execution_id.short(),
            status = %self.snapshot.status,
            percentage = self.snapshot.percentage,
            requests = self.snapshot.total_requests,
            "progress"
        );
        self.emit(MonitorEvent::Progress {
            execution_id: self.execution_id.clone(),
            snapshot: self.snapshot.clone(),
        })
        .await;
        Flow::Continue
    }

    /// The process has exited: drain the log, then fall back to the exit code.
    async fn finish(&mut self, code: Option<i32>) {
        info!(execution_id = %self.execution_id, exit_code = ?code, "load tool exited");

        let mut lines = match self.tail.read_new_lines().await {
            Ok(lines) => lines.unwrap_or_default(),
            Err(e) => {
                warn!(execution_id = %self.execution_id, error = %format!("{e:#}"), "error draining log file");
                Vec::new()
            }
        };
        lines.extend(self.tail.flush());

        if !lines.is_empty() && self.process_lines(lines).await == Flow::Stop {
            return;
        }

        let applied = self.snapshot.finish_from_exit(code);
        if applied.is_terminal() {
            self.settle(applied).await;
        }
    }

    /// Handle a cancel request. Returns the cancelled snapshot, or `None` if
    /// the execution finished first.
    async fn cancel(&mut self) -> Option<ProgressSnapshot> {
        if let Some(code) = self.try_exit_code() {
            debug!(execution_id = %self.execution_id, "cancel arrived after the load tool exited");
            self.finish(code).await;
            return None;
        }

        info!(execution_id = %self.execution_id, "cancelling execution; terminating load tool");
        if let Some(child) = self.child.as_mut() {
            terminate(child, self.settings.cancel_grace).await;
        }
        self.child = None;

        self.snapshot.cancel().then(|| self.snapshot.clone())
    }

    /// Publish and report a terminal outcome.
    async fn settle(&mut self, applied: Applied) {
        let event = match applied {
            Applied::Completed => {
                info!(
                    execution_id = %self.execution_id,
                    report = ?self.snapshot.report_path,
                    requests = self.snapshot.total_requests,
                    ok = self.snapshot.successful_requests,
                    "execution completed"
                );
                MonitorEvent::Completed {
                    execution_id: self.execution_id.clone(),
                    snapshot: self.snapshot.clone(),
                }
            }
            Applied::Failed(message) => {
                error!(execution_id = %self.execution_id, error = %message, "execution failed");
                MonitorEvent::Error {
                    execution_id: self.execution_id.clone(),
                    message,
                    snapshot: self.snapshot.clone(),
                }
            }
            _ => return,
        };
        self.emit(event).await;
    }

    /// `Some(exit code)` once the process has exited; the inner `None` means
    /// it was killed by a signal.
    fn try_exit_code(&mut self) -> Option<Option<i32>> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.code()),
            Ok(None) => None,
            Err(e) => {
                warn!(execution_id = %self.execution_id, error = %e, "failed to query load tool status");
                None
            }
        }
    }

    /// Terminal snapshots are never published; see [`MonitorHandle`].
    fn publish(&self) {
        if !self.snapshot.is_terminal() {
            self.progress_tx.send_replace(self.snapshot.clone());
        }
    }

    async fn emit(&self, event: MonitorEvent) {
        if self.events.send(EngineEvent::Monitor(event)).await.is_err() {
            debug!(execution_id = %self.execution_id, "engine gone; dropping monitor event");
        }
    }

    /// Reap a process that is still running after monitoring stopped (the
    /// tool may linger briefly after printing its report location).
    fn release_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        let execution_id = self.execution_id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(%execution_id, exit_code = ?status.code(), "load tool reaped"),
                Err(e) => warn!(%execution_id, error = %e, "failed to reap load tool"),
            }
        });
    }
}
