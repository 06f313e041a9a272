use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use loadbatch::engine::{EngineEvent, ExecutionLauncher};
use loadbatch::errors::{EngineError, Result};
use loadbatch::monitor::{CancelRequest, LogEvent, MonitorEvent, MonitorHandle};
use loadbatch::snapshot::{Applied, ProgressSnapshot};
use loadbatch::submission::SubmissionSpec;
use loadbatch::types::{ExecutionId, ExecutionStatus};

/// One step of a scripted execution.
#[derive(Debug, Clone)]
pub enum Step {
    /// Fold a log event into the snapshot, as if the tool had printed it.
    Log(LogEvent),
    /// Wait; a cancel request arriving meanwhile is honoured.
    Sleep(Duration),
    /// The "process" exits with this code.
    Exit(Option<i32>),
}

/// A launcher that never spawns a process.
///
/// Each launch plays a script on a background task, publishing snapshots and
/// monitor events exactly like the real output monitor. If the script ends
/// without a terminal state the execution stays active until cancelled.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    scripts: Vec<Vec<Step>>,
    fail_launch: Option<String>,
    launched: Arc<Mutex<Vec<ExecutionId>>>,
}

impl ScriptedLauncher {
    /// Every launch plays `script`.
    pub fn new(script: Vec<Step>) -> Self {
        Self::sequence(vec![script])
    }

    /// The n-th launch plays `scripts[n]`; launches past the end replay the
    /// last script.
    pub fn sequence(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts,
            ..Self::default()
        }
    }

    /// Every launch fails with `LaunchFailed(message)`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_launch: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Ids launched so far, shared with clones of this launcher.
    pub fn launched(&self) -> Arc<Mutex<Vec<ExecutionId>>> {
        Arc::clone(&self.launched)
    }
}

impl ExecutionLauncher for ScriptedLauncher {
    fn launch(
        &mut self,
        execution_id: &ExecutionId,
        _spec: &SubmissionSpec,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<MonitorHandle> {
        if let Some(message) = &self.fail_launch {
            return Err(EngineError::LaunchFailed(message.clone()));
        }

        let mut snapshot = ProgressSnapshot::new();
        snapshot.advance_to(ExecutionStatus::Preparing);
        let (progress_tx, progress_rx) = watch::channel(snapshot.clone());
        let (cancel_tx, cancel_rx) = oneshot::channel::<CancelRequest>();

        let player = Player {
            execution_id: execution_id.clone(),
            snapshot,
            progress_tx,
            events,
        };
        let mut launched = self.launched.lock().unwrap();
        let script = self
            .scripts
            .get(launched.len())
            .or(self.scripts.last())
            .cloned()
            .unwrap_or_default();
        tokio::spawn(player.play(script, cancel_rx));

        launched.push(execution_id.clone());
        Ok(MonitorHandle::new(execution_id.clone(), progress_rx, cancel_tx))
    }
}

struct Player {
    execution_id: ExecutionId,
    snapshot: ProgressSnapshot,
    progress_tx: watch::Sender<ProgressSnapshot>,
    events: mpsc::Sender<EngineEvent>,
}

impl Player {
    async fn play(mut self, script: Vec<Step>, mut cancel_rx: oneshot::Receiver<CancelRequest>) {
        let mut cancel_open = true;

        for step in script {
            match step {
                Step::Sleep(duration) => {
                    let sleep = tokio::time::sleep(duration);
                    tokio::pin!(sleep);
                    loop {
                        tokio::select! {
                            _ = &mut sleep => break,
                            request = &mut cancel_rx, if cancel_open => match request {
                                Ok(reply) => {
                                    let _ = reply.send(self.cancel());
                                    return;
                                }
                                Err(_) => cancel_open = false,
                            },
                        }
                    }
                }
                Step::Log(event) => {
                    let applied = self.snapshot.apply(event);
                    if self.settle(applied).await {
                        break;
                    }
                }
                Step::Exit(code) => {
                    let applied = self.snapshot.finish_from_exit(code);
                    self.settle(applied).await;
                    break;
                }
            }
        }

        // Finished or idle: a cancel arriving now finds either a terminal
        // snapshot (lost race) or a still-running execution.
        if cancel_open {
            if let Ok(reply) = cancel_rx.await {
                let _ = reply.send(self.cancel());
            }
        }
    }

    fn cancel(&mut self) -> Option<ProgressSnapshot> {
        self.snapshot.cancel().then(|| self.snapshot.clone())
    }

    /// Only non-terminal snapshots go on the progress channel.
    fn publish(&self) {
        if !self.snapshot.is_terminal() {
            self.progress_tx.send_replace(self.snapshot.clone());
        }
    }

    /// Publish and emit; `true` once the snapshot is terminal.
    async fn settle(&mut self, applied: Applied) -> bool {
        self.publish();
        let execution_id = self.execution_id.clone();
        let snapshot = self.snapshot.clone();

        let (event, terminal) = match applied {
            Applied::Completed => (MonitorEvent::Completed { execution_id, snapshot }, true),
            Applied::Failed(message) => (
                MonitorEvent::Error {
                    execution_id,
                    message,
                    snapshot,
                },
                true,
            ),
            Applied::SoftError(message) => (
                MonitorEvent::Error {
                    execution_id,
                    message,
                    snapshot,
                },
                false,
            ),
            Applied::Updated | Applied::Ignored => {
                (MonitorEvent::Progress { execution_id, snapshot }, false)
            }
        };

        let _ = self.events.send(EngineEvent::Monitor(event)).await;
        terminal
    }
}
