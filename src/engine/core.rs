// src/engine/core.rs

//! Pure execution registry.
//!
//! This module holds the synchronous, deterministic part of the engine: the
//! map from execution id to [`ExecutionRecord`] and the active -> archived
//! transition. It has no channels and performs no IO, so it is unit tested
//! with a fake live handle.
//!
//! The async shell (`engine::runtime::EngineRuntime`) owns the only
//! `Registry` instance and is the only task that mutates it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::engine::report::{EngineStats, StatusReport, Timestamps};
use crate::record::PersistedExecution;
use crate::snapshot::ProgressSnapshot;
use crate::submission::TestParameters;
use crate::types::{ExecutionId, ExecutionStatus};

/// Something that can report an execution's current progress.
pub trait LiveProgress {
    fn current_progress(&self) -> ProgressSnapshot;
}

impl LiveProgress for crate::monitor::MonitorHandle {
    fn current_progress(&self) -> ProgressSnapshot {
        crate::monitor::MonitorHandle::current_progress(self)
    }
}

/// Either a live handle or a frozen terminal snapshot, never both.
#[derive(Debug)]
pub enum ExecutionState<H> {
    Active(H),
    Archived(ProgressSnapshot),
}

#[derive(Debug)]
pub struct ExecutionRecord<H> {
    pub execution_id: ExecutionId,
    pub base_url: String,
    pub parameters: TestParameters,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: ExecutionState<H>,
}

impl<H: LiveProgress> ExecutionRecord<H> {
    pub fn is_active(&self) -> bool {
        matches!(self.state, ExecutionState::Active(_))
    }

    pub fn report(&self) -> StatusReport {
        let timestamps = Timestamps {
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        };
        match &self.state {
            ExecutionState::Active(handle) => {
                StatusReport::build(&self.execution_id, timestamps, &handle.current_progress(), true)
            }
            ExecutionState::Archived(snapshot) => {
                StatusReport::build(&self.execution_id, timestamps, snapshot, false)
            }
        }
    }

    /// Record for the persistence boundary, built from `snapshot`.
    pub fn persisted(&self, snapshot: &ProgressSnapshot) -> PersistedExecution {
        PersistedExecution {
            execution_id: self.execution_id.clone(),
            status: snapshot.status,
            base_url: self.base_url.clone(),
            parameters: self.parameters,
            submitted_at: self.submitted_at,
            completed_at: self.completed_at,
            report_path: snapshot.report_path.clone(),
            error_message: snapshot.error_message.clone(),
            total_requests: snapshot.total_requests,
            successful_requests: snapshot.successful_requests,
            failed_requests: snapshot.failed_requests,
        }
    }
}

/// All executions known to the engine.
#[derive(Debug)]
pub struct Registry<H> {
    records: HashMap<ExecutionId, ExecutionRecord<H>>,
    history_limit: Option<usize>,
    archived: usize,
}

impl<H: LiveProgress> Registry<H> {
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            records: HashMap::new(),
            history_limit,
            archived: 0,
        }
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert a new record, handing it back if the id is already taken.
    pub fn register(&mut self, record: ExecutionRecord<H>) -> Result<(), ExecutionRecord<H>> {
        if self.records.contains_key(&record.execution_id) {
            return Err(record);
        }
        if !record.is_active() {
            self.archived += 1;
        }
        self.records.insert(record.execution_id.clone(), record);
        self.evict_if_needed();
        Ok(())
    }

    /// Live snapshot for an active execution, frozen one otherwise.
    pub fn status(&self, id: &ExecutionId) -> Option<StatusReport> {
        self.records.get(id).map(ExecutionRecord::report)
    }

    /// The live handle, if the execution is still active.
    pub fn active_handle_mut(&mut self, id: &ExecutionId) -> Option<&mut H> {
        match self.records.get_mut(id).map(|r| &mut r.state) {
            Some(ExecutionState::Active(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn active_ids(&self) -> Vec<ExecutionId> {
        let mut ids: Vec<_> = self
            .records
            .values()
            .filter(|r| r.is_active())
            .map(|r| r.execution_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Move an active execution to the archive with a terminal snapshot.
    ///
    /// Returns the record to persist, or `None` if the execution was not
    /// active (unknown or already archived). The live handle is dropped.
    pub fn archive(
        &mut self,
        id: &ExecutionId,
        mut snapshot: ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> Option<PersistedExecution> {
        let record = self.records.get_mut(id)?;
        if !record.is_active() {
            return None;
        }

        if snapshot.status == ExecutionStatus::Completed {
            snapshot.percentage = 100.0;
        }
        record.completed_at = Some(now);
        let persisted = record.persisted(&snapshot);
        record.state = ExecutionState::Archived(snapshot);
        self.archived += 1;

        self.evict_if_needed();
        Some(persisted)
    }

    /// Up to `limit` reports, newest submission first.
    pub fn list(&self, limit: usize) -> Vec<StatusReport> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        records.into_iter().take(limit).map(ExecutionRecord::report).collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active: self.records.len() - self.archived,
            archived: self.archived,
            total: self.records.len(),
        }
    }

    fn evict_if_needed(&mut self) {
        let Some(limit) = self.history_limit else {
            return;
        };
        while self.archived > limit {
            let oldest = self
                .records
                .values()
                .filter(|r| !r.is_active())
                .min_by(|a, b| {
                    a.submitted_at
                        .cmp(&b.submitted_at)
                        .then_with(|| a.execution_id.cmp(&b.execution_id))
                })
                .map(|r| r.execution_id.clone());

            match oldest {
                Some(id) => {
                    self.records.remove(&id);
                    self.archived -= 1;
                    tracing::debug!(execution_id = %id, "evicted archived execution");
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default)]
    struct FakeLive(Rc<RefCell<ProgressSnapshot>>);

    impl LiveProgress for FakeLive {
        fn current_progress(&self) -> ProgressSnapshot {
            self.0.borrow().clone()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn active(id: &str, submitted: i64, live: &FakeLive) -> ExecutionRecord<FakeLive> {
        ExecutionRecord {
            execution_id: ExecutionId::new(id),
            base_url: "http://localhost".to_string(),
            parameters: TestParameters::default(),
            submitted_at: at(submitted),
            started_at: Some(at(submitted)),
            completed_at: None,
            state: ExecutionState::Active(live.clone()),
        }
    }

    fn terminal(status: ExecutionStatus) -> ProgressSnapshot {
        ProgressSnapshot {
            status,
            percentage: 60.0,
            message: format!("{status}"),
            ..ProgressSnapshot::default()
        }
    }

    #[test]
    fn status_reads_live_handle_while_active() {
        let live = FakeLive::default();
        let mut reg = Registry::new(None);
        reg.register(active("a", 0, &live)).unwrap();

        live.0.borrow_mut().status = ExecutionStatus::Running;
        live.0.borrow_mut().percentage = 42.0;

        let report = reg.status(&ExecutionId::new("a")).unwrap();
        assert_eq!(report.status, ExecutionStatus::Running);
        assert_eq!(report.percentage, 42.0);
        assert_eq!(report.message, "Real-time monitoring active - Running");
        assert!(reg.status(&ExecutionId::new("missing")).is_none());
    }

    #[test]
    fn archive_freezes_and_forces_full_percentage_on_completion() {
        let live = FakeLive::default();
        let mut reg = Registry::new(None);
        let id = ExecutionId::new("a");
        reg.register(active("a", 0, &live)).unwrap();

        let persisted = reg.archive(&id, terminal(ExecutionStatus::Completed), at(10)).unwrap();
        assert_eq!(persisted.status, ExecutionStatus::Completed);
        assert_eq!(persisted.completed_at, Some(at(10)));

        // Later changes to the (dropped) live handle are invisible.
        live.0.borrow_mut().percentage = 5.0;
        let report = reg.status(&id).unwrap();
        assert_eq!(report.percentage, 100.0);
        assert_eq!(report.message, "completed");
        assert_eq!(reg.status(&id), Some(report));
    }

    #[test]
    fn archive_is_one_shot() {
        let live = FakeLive::default();
        let mut reg = Registry::new(None);
        let id = ExecutionId::new("a");
        reg.register(active("a", 0, &live)).unwrap();

        assert!(reg.archive(&id, terminal(ExecutionStatus::Failed), at(1)).is_some());
        assert!(reg.archive(&id, terminal(ExecutionStatus::Cancelled), at(2)).is_none());
        assert_eq!(reg.status(&id).unwrap().status, ExecutionStatus::Failed);
        assert!(reg.active_handle_mut(&id).is_none());
        assert!(reg.archive(&ExecutionId::new("nope"), terminal(ExecutionStatus::Failed), at(3)).is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let live = FakeLive::default();
        let mut reg = Registry::new(None);
        reg.register(active("a", 0, &live)).unwrap();
        assert!(reg.register(active("a", 1, &live)).is_err());
        assert_eq!(reg.stats().total, 1);
    }

    #[test]
    fn list_is_newest_first_and_truncated() {
        let live = FakeLive::default();
        let mut reg = Registry::new(None);
        reg.register(active("old", 0, &live)).unwrap();
        reg.register(active("mid", 5, &live)).unwrap();
        reg.register(active("new", 9, &live)).unwrap();
        reg.archive(&ExecutionId::new("mid"), terminal(ExecutionStatus::Completed), at(20));

        let ids: Vec<_> = reg.list(2).into_iter().map(|r| r.execution_id).collect();
        assert_eq!(ids, vec![ExecutionId::new("new"), ExecutionId::new("mid")]);
        assert_eq!(reg.list(10).len(), 3);
        assert!(reg.list(0).is_empty());
    }

    #[test]
    fn stats_count_both_states() {
        let live = FakeLive::default();
        let mut reg = Registry::new(None);
        reg.register(active("a", 0, &live)).unwrap();
        reg.register(active("b", 1, &live)).unwrap();
        reg.archive(&ExecutionId::new("a"), terminal(ExecutionStatus::Cancelled), at(2));

        assert_eq!(
            reg.stats(),
            EngineStats {
                active: 1,
                archived: 1,
                total: 2
            }
        );
        assert_eq!(reg.active_ids(), vec![ExecutionId::new("b")]);
    }

    #[test]
    fn history_limit_evicts_oldest_archived_only() {
        let live = FakeLive::default();
        let mut reg = Registry::new(Some(2));
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            reg.register(active(id, i as i64, &live)).unwrap();
        }

        reg.archive(&ExecutionId::new("b"), terminal(ExecutionStatus::Completed), at(10));
        reg.archive(&ExecutionId::new("c"), terminal(ExecutionStatus::Completed), at(11));
        reg.archive(&ExecutionId::new("d"), terminal(ExecutionStatus::Completed), at(12));

        // "b" was the oldest archived; "a" is still active and never evicted.
        assert!(!reg.contains(&ExecutionId::new("b")));
        assert!(reg.contains(&ExecutionId::new("a")));
        assert_eq!(reg.stats().archived, 2);
    }
}
