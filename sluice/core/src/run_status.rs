//! Run level status derived from lifecycle events and published to a shared run store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use sluice_schemas::{EventKind, RunEvent, RunStatus, RunStatusRecord};
use tracing::{debug, info};

/// Externally owned store of run records.
///
/// Writers must be serialised per run id. Within sluice that holds because a
/// run's batches are applied by a single subscription, one at a time.
pub trait RunRecordStore: Send + Sync {
    fn read_status(&self, run_id: &str) -> Option<RunStatusRecord>;

    fn write_status(&self, run_id: &str, status: RunStatus, can_terminate: bool);
}

/// Process-memory run record store
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    records: RwLock<HashMap<String, RunStatusRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunRecordStore for InMemoryRunStore {
    fn read_status(&self, run_id: &str) -> Option<RunStatusRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .copied()
    }

    fn write_status(&self, run_id: &str, status: RunStatus, can_terminate: bool) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                run_id.to_string(),
                RunStatusRecord {
                    status,
                    can_terminate,
                },
            );
    }
}

/// Run status implied by a lifecycle event, `None` for every other event
pub fn lifecycle_status(kind: &EventKind) -> Option<RunStatus> {
    match kind {
        EventKind::RunEnqueued => Some(RunStatus::Queued),
        EventKind::RunDequeued => Some(RunStatus::Starting),
        EventKind::RunStart => Some(RunStatus::Started),
        EventKind::RunCanceling => Some(RunStatus::Canceling),
        EventKind::RunSuccess => Some(RunStatus::Success),
        EventKind::RunFailure { .. } | EventKind::RunInitFailure { .. } => Some(RunStatus::Failure),
        EventKind::RunCanceled => Some(RunStatus::Canceled),
        EventKind::RunStarting
        | EventKind::ProcessStart
        | EventKind::ProcessStarted { .. }
        | EventKind::ProcessExited { .. }
        | EventKind::EngineEvent { .. }
        | EventKind::StepStart
        | EventKind::StepSuccess
        | EventKind::StepFailure { .. }
        | EventKind::StepSkipped
        | EventKind::StepInput { .. }
        | EventKind::StepOutput { .. }
        | EventKind::Materialization { .. }
        | EventKind::ExpectationResult { .. }
        | EventKind::LogMessage => None,
    }
}

/// Most recent status implied by the lifecycle events of `events`.
///
/// Returns `None` when the batch holds no lifecycle event. Once a terminal
/// status is seen the run can no longer be terminated, whatever follows it.
pub fn derive_status(events: &[RunEvent]) -> Option<RunStatusRecord> {
    let mut latest = None;
    let mut saw_terminal = false;

    for status in events.iter().filter_map(|event| lifecycle_status(&event.kind)) {
        saw_terminal |= status.is_terminal();
        latest = Some(status);
    }

    latest.map(|status| RunStatusRecord {
        status,
        can_terminate: status.can_terminate() && !saw_terminal,
    })
}

/// Publishes run status derived from incoming batches to a [`RunRecordStore`]
pub struct RunStatusSync<S> {
    store: Arc<S>,
}

impl<S> Clone for RunStatusSync<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: RunRecordStore> RunStatusSync<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Publish the status implied by `batch`. Batches without lifecycle events
    /// leave the stored record untouched.
    pub fn publish(&self, run_id: &str, batch: &[RunEvent]) -> Option<RunStatusRecord> {
        let Some(record) = derive_status(batch) else {
            debug!(run_id, "No lifecycle events in batch, status unchanged");
            return None;
        };

        info!(
            run_id,
            status = %record.status,
            can_terminate = record.can_terminate,
            "Publishing run status"
        );
        self.store
            .write_status(run_id, record.status, record.can_terminate);
        Some(record)
    }
}
