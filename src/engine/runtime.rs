// src/engine/runtime.rs

use std::fmt;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::clock::{Clock, IdGenerator};
use crate::engine::core::{ExecutionRecord, ExecutionState, Registry};
use crate::engine::launcher::ExecutionLauncher;
use crate::engine::report::SubmissionReceipt;
use crate::engine::EngineEvent;
use crate::errors::{EngineError, Result};
use crate::monitor::{MonitorEvent, MonitorHandle};
use crate::record::{PersistedExecution, RecordSink};
use crate::snapshot::ProgressSnapshot;
use crate::submission::SubmissionSpec;
use crate::types::{ExecutionId, ExecutionStatus};

const ID_ATTEMPTS: usize = 8;

/// The single task that owns the execution registry.
///
/// Requests from [`BatchEngine`](crate::engine::BatchEngine) handles and
/// events from output monitors arrive on one channel and are handled one at
/// a time, so every registry transition is atomic with respect to readers.
pub struct EngineRuntime<L: ExecutionLauncher> {
    registry: Registry<MonitorHandle>,
    event_rx: mpsc::Receiver<EngineEvent>,
    // Weak: the channel closes once every handle and monitor is gone.
    event_tx: mpsc::WeakSender<EngineEvent>,
    launcher: L,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    sink: Box<dyn RecordSink>,
    pending_cancels: usize,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl<L: ExecutionLauncher> fmt::Debug for EngineRuntime<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("registry", &self.registry.stats())
            .field("pending_cancels", &self.pending_cancels)
            .finish_non_exhaustive()
    }
}

impl<L: ExecutionLauncher> EngineRuntime<L> {
    pub fn new(
        event_rx: mpsc::Receiver<EngineEvent>,
        event_tx: mpsc::WeakSender<EngineEvent>,
        launcher: L,
        clock: Box<dyn Clock>,
        ids: Box<dyn IdGenerator>,
        sink: Box<dyn RecordSink>,
        history_limit: Option<usize>,
    ) -> Self {
        Self {
            registry: Registry::new(history_limit),
            event_rx,
            event_tx,
            launcher,
            clock,
            ids,
            sink,
            pending_cancels: 0,
            shutdown_waiters: Vec::new(),
        }
    }

    /// Main event loop. Returns when shutdown has finished or every sender
    /// is gone.
    pub async fn run(mut self) {
        info!("batch engine started");

        while let Some(event) = self.event_rx.recv().await {
            self.handle_event(event);

            if self.shutdown_complete() {
                break;
            }
        }

        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        info!(stats = ?self.registry.stats(), "batch engine stopped");
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Submit { spec, reply } => {
                let result = self.submit(*spec);
                let _ = reply.send(result);
            }
            EngineEvent::Status { id, reply } => {
                let result = self.registry.status(&id).ok_or(EngineError::NotFound(id));
                let _ = reply.send(result);
            }
            EngineEvent::Cancel { id, reply } => self.request_cancel(id, Some(reply)),
            EngineEvent::List { limit, reply } => {
                let _ = reply.send(self.registry.list(limit));
            }
            EngineEvent::Stats { reply } => {
                let _ = reply.send(self.registry.stats());
            }
            EngineEvent::Shutdown { reply } => self.begin_shutdown(reply),
            EngineEvent::Monitor(event) => self.handle_monitor_event(event),
            EngineEvent::CancelSettled { id, outcome, reply } => {
                self.pending_cancels = self.pending_cancels.saturating_sub(1);
                let cancelled = match outcome {
                    Some(snapshot) => self.archive_cancelled(&id, snapshot),
                    None => false,
                };
                if let Some(reply) = reply {
                    let _ = reply.send(cancelled);
                }
            }
        }
    }

    fn submit(&mut self, spec: SubmissionSpec) -> Result<SubmissionReceipt> {
        if self.is_shutting_down() {
            return Err(EngineError::EngineStopped);
        }
        let events = self.event_tx.upgrade().ok_or(EngineError::EngineStopped)?;

        let execution_id = self.fresh_id()?;
        let submitted_at = self.clock.now();

        let handle = match self.launcher.launch(&execution_id, &spec, events) {
            Ok(handle) => handle,
            Err(e) => {
                error!(%execution_id, error = %e, "submission failed; no execution recorded");
                return Err(e);
            }
        };

        let record = ExecutionRecord {
            execution_id: execution_id.clone(),
            base_url: spec.base_url.clone(),
            parameters: spec.parameters,
            submitted_at,
            started_at: Some(self.clock.now()),
            completed_at: None,
            state: ExecutionState::Active(handle),
        };
        let persisted = record.persisted(&ProgressSnapshot::new());

        if self.registry.register(record).is_err() {
            return Err(EngineError::Other(anyhow!(
                "execution id {execution_id} registered twice"
            )));
        }
        self.persist(&persisted);

        let estimated_duration_minutes = spec.estimated_duration_minutes();
        info!(
            %execution_id,
            endpoints = spec.endpoints.len(),
            vu = spec.parameters.virtual_users,
            estimated_minutes = estimated_duration_minutes,
            "execution submitted"
        );

        Ok(SubmissionReceipt {
            execution_id,
            submitted_at,
            estimated_duration_minutes,
            status: ExecutionStatus::Submitted,
            message: format!(
                "Load test started: {} endpoint(s), {} virtual user(s) for {}s",
                spec.endpoints.len(),
                spec.parameters.virtual_users,
                spec.parameters.duration_seconds
            ),
        })
    }

    fn fresh_id(&mut self) -> Result<ExecutionId> {
        for _ in 0..ID_ATTEMPTS {
            let id = self.ids.next_id();
            if !self.registry.contains(&id) {
                return Ok(id);
            }
            warn!(execution_id = %id, "generated execution id already in use; retrying");
        }
        Err(EngineError::Other(anyhow!(
            "no unused execution id after {ID_ATTEMPTS} attempts"
        )))
    }

    /// Ask the execution's monitor to cancel and settle the answer later via
    /// `CancelSettled`, so the loop never waits on the grace period.
    fn request_cancel(&mut self, id: ExecutionId, reply: Option<oneshot::Sender<bool>>) {
        let receiver = match self.event_tx.upgrade() {
            Some(events) => self
                .registry
                .active_handle_mut(&id)
                .and_then(MonitorHandle::request_cancel)
                .map(|receiver| (receiver, events)),
            None => None,
        };

        let Some((receiver, events)) = receiver else {
            debug!(execution_id = %id, "cancel ignored; execution not active");
            if let Some(reply) = reply {
                let _ = reply.send(false);
            }
            return;
        };

        info!(execution_id = %id, "cancel requested");
        self.pending_cancels += 1;
        tokio::spawn(async move {
            let outcome = receiver.await.ok().flatten();
            let _ = events
                .send(EngineEvent::CancelSettled { id, outcome, reply })
                .await;
        });
    }

    fn archive_cancelled(&mut self, id: &ExecutionId, snapshot: ProgressSnapshot) -> bool {
        if snapshot.status != ExecutionStatus::Cancelled {
            warn!(execution_id = %id, status = %snapshot.status, "cancel settled without a cancelled snapshot");
            return false;
        }
        self.archive(id, snapshot)
    }

    fn handle_monitor_event(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Progress { execution_id, snapshot } => {
                debug!(
                    %execution_id,
                    status = %snapshot.status,
                    percentage = snapshot.percentage,
                    "progress update"
                );
            }
            MonitorEvent::Completed { execution_id, snapshot } => {
                self.archive(&execution_id, snapshot);
            }
            MonitorEvent::Error { execution_id, message, snapshot } => {
                if snapshot.is_terminal() {
                    self.archive(&execution_id, snapshot);
                } else {
                    warn!(%execution_id, error = %message, "soft error; execution continues");
                }
            }
        }
    }

    fn archive(&mut self, id: &ExecutionId, snapshot: ProgressSnapshot) -> bool {
        let status = snapshot.status;
        match self.registry.archive(id, snapshot, self.clock.now()) {
            Some(persisted) => {
                info!(execution_id = %id, %status, "execution archived");
                self.persist(&persisted);
                true
            }
            None => {
                debug!(execution_id = %id, %status, "terminal event for inactive execution ignored");
                false
            }
        }
    }

    fn persist(&mut self, record: &PersistedExecution) {
        if let Err(e) = self.sink.record(record) {
            warn!(
                execution_id = %record.execution_id,
                error = %format!("{e:#}"),
                "failed to persist execution record"
            );
        }
    }

    fn begin_shutdown(&mut self, reply: oneshot::Sender<()>) {
        self.shutdown_waiters.push(reply);
        if self.shutdown_waiters.len() > 1 {
            return;
        }

        let active = self.registry.active_ids();
        info!(active = active.len(), "shutting down batch engine");
        for id in active {
            self.request_cancel(id, None);
        }
    }

    fn is_shutting_down(&self) -> bool {
        !self.shutdown_waiters.is_empty()
    }

    fn shutdown_complete(&self) -> bool {
        self.is_shutting_down() && self.pending_cancels == 0
    }
}
