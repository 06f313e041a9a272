// src/engine/handle.rs

//! Caller-facing handle to the engine task.

use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::engine::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::engine::launcher::{ExecutionLauncher, ProcessLauncher};
use crate::engine::report::{EngineStats, StatusReport, SubmissionReceipt};
use crate::engine::runtime::EngineRuntime;
use crate::engine::EngineEvent;
use crate::errors::{EngineError, Result};
use crate::record::{JsonLinesSink, LogSink, RecordSink};
use crate::submission::SubmissionSpec;
use crate::types::ExecutionId;

const CHANNEL_CAPACITY: usize = 256;

/// Cloneable handle to a running engine.
///
/// Every method is a request/reply round trip to the engine task; none of
/// them wait for an execution to make progress.
#[derive(Debug, Clone)]
pub struct BatchEngine {
    tx: mpsc::Sender<EngineEvent>,
}

impl BatchEngine {
    pub fn builder<L: ExecutionLauncher>(launcher: L) -> EngineBuilder<L> {
        EngineBuilder::new(launcher)
    }

    /// Production engine: subprocess launcher, system clock, uuid ids and
    /// the record sink named by the config.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: &EngineConfig) -> BatchEngine {
        let sink: Box<dyn RecordSink> = match &config.record_file {
            Some(path) => Box::new(JsonLinesSink::new(path)),
            None => Box::new(LogSink),
        };

        BatchEngine::builder(ProcessLauncher::from_config(config))
            .record_sink(sink)
            .history_limit(config.history_limit)
            .spawn()
    }

    /// Start a new execution. Returns as soon as the load tool is running.
    pub async fn submit(&self, spec: SubmissionSpec) -> Result<SubmissionReceipt> {
        self.request(|reply| EngineEvent::Submit {
            spec: Box::new(spec),
            reply,
        })
        .await?
    }

    /// Current status; `NotFound` if the id is unknown or was evicted.
    pub async fn status(&self, id: &ExecutionId) -> Result<StatusReport> {
        self.request(|reply| EngineEvent::Status {
            id: id.clone(),
            reply,
        })
        .await?
    }

    /// Cancel an active execution.
    ///
    /// Resolves once the process is confirmed gone. `false` if the execution
    /// is unknown, already terminal or finished while the cancel was in
    /// flight.
    pub async fn cancel(&self, id: &ExecutionId) -> Result<bool> {
        self.request(|reply| EngineEvent::Cancel {
            id: id.clone(),
            reply,
        })
        .await
    }

    /// Up to `limit` executions, newest submission first.
    pub async fn list(&self, limit: usize) -> Result<Vec<StatusReport>> {
        self.request(|reply| EngineEvent::List { limit, reply }).await
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.request(|reply| EngineEvent::Stats { reply }).await
    }

    /// Cancel every active execution and stop the engine task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| EngineEvent::Shutdown { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineEvent) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::EngineStopped)?;
        reply_rx.await.map_err(|_| EngineError::EngineStopped)
    }
}

/// Assembles the engine task's collaborators.
pub struct EngineBuilder<L> {
    launcher: L,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    sink: Box<dyn RecordSink>,
    history_limit: Option<usize>,
}

impl<L: ExecutionLauncher> EngineBuilder<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            clock: Box::new(SystemClock),
            ids: Box::new(UuidGenerator),
            sink: Box::new(LogSink),
            history_limit: None,
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn record_sink(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Keep at most `limit` archived executions. `None` keeps all of them.
    pub fn history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Start the engine task. Must be called from within a Tokio runtime.
    pub fn spawn(self) -> BatchEngine {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let runtime = EngineRuntime::new(
            rx,
            tx.downgrade(),
            self.launcher,
            self.clock,
            self.ids,
            self.sink,
            self.history_limit,
        );
        tokio::spawn(runtime.run());
        BatchEngine { tx }
    }
}
