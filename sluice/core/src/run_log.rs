//! The authoritative event log of a single run, rebuilt from stream updates.

use std::collections::{BTreeMap, HashSet};

use sluice_schemas::{LogFilter, RunEvent, RunMetadata, StepState};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::log_filter::filter_logs;
use crate::step_state::{extract_metadata, reduce};
use crate::stream::{StreamUpdate, SubscriptionFailure};

/// What applying a [`StreamUpdate`] did to a [`RunLog`]
#[derive(Debug, Clone, PartialEq)]
pub enum LogChange {
    /// `count` events were appended within the current epoch
    Appended { epoch: u64, count: usize },
    /// A new epoch started and the log now holds only its first batch
    Reset { epoch: u64, count: usize },
    /// A batch from an earlier epoch arrived late and was ignored
    Stale { epoch: u64 },
    Failed(SubscriptionFailure),
    Ended(TransportError),
}

impl LogChange {
    /// Number of events that entered the log with this change
    pub fn new_events(&self) -> usize {
        match self {
            LogChange::Appended { count, .. } | LogChange::Reset { count, .. } => *count,
            LogChange::Stale { .. } | LogChange::Failed(_) | LogChange::Ended(_) => 0,
        }
    }

    /// Whether no further updates follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogChange::Failed(_) | LogChange::Ended(_))
    }
}

/// Filtered view of a [`RunLog`], as handed to renderers
#[derive(Debug, Clone, PartialEq)]
pub struct LogsView<'a> {
    pub display: Vec<&'a RunEvent>,
    pub search_matches: Vec<&'a RunEvent>,
    pub has_text_filter: bool,
    /// Whether the first batch has arrived
    pub loaded: bool,
}

/// Ordered event log of one run.
///
/// Derived state is never cached: [`RunLog::steps`] and [`RunLog::metadata`]
/// recompute from the log so a reset can never leave stale records behind.
#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: String,
    epoch: u64,
    events: Vec<RunEvent>,
    loaded: bool,
    failure: Option<SubscriptionFailure>,
    ended: Option<TransportError>,
}

impl RunLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            epoch: 0,
            events: Vec::new(),
            loaded: false,
            failure: None,
            ended: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn failure(&self) -> Option<&SubscriptionFailure> {
        self.failure.as_ref()
    }

    pub fn ended(&self) -> Option<&TransportError> {
        self.ended.as_ref()
    }

    /// Apply one update in delivery order
    pub fn apply(&mut self, update: StreamUpdate) -> LogChange {
        match update {
            StreamUpdate::Batch(batch) if batch.epoch < self.epoch => {
                warn!(
                    run_id = %self.run_id,
                    batch_epoch = batch.epoch,
                    epoch = self.epoch,
                    "Ignoring batch from a previous epoch"
                );
                LogChange::Stale { epoch: batch.epoch }
            }
            StreamUpdate::Batch(batch) if batch.epoch > self.epoch || batch.first_in_epoch => {
                if self.loaded {
                    info!(
                        run_id = %self.run_id,
                        epoch = batch.epoch,
                        discarded = self.events.len(),
                        "Resetting run log for new epoch"
                    );
                }
                let count = batch.events.len();
                self.epoch = batch.epoch;
                self.events = batch.events;
                self.loaded = true;
                LogChange::Reset {
                    epoch: self.epoch,
                    count,
                }
            }
            StreamUpdate::Batch(mut batch) => {
                let count = batch.events.len();
                debug!(run_id = %self.run_id, epoch = self.epoch, count, "Appending batch");
                self.events.append(&mut batch.events);
                LogChange::Appended {
                    epoch: self.epoch,
                    count,
                }
            }
            StreamUpdate::Failure(failure) => {
                warn!(run_id = %self.run_id, kind = ?failure.kind, "{}", failure.message);
                self.failure = Some(failure.clone());
                LogChange::Failed(failure)
            }
            StreamUpdate::Ended(reason) => {
                warn!(run_id = %self.run_id, "Event stream ended: {}", reason);
                self.ended = Some(reason.clone());
                LogChange::Ended(reason)
            }
        }
    }

    /// Events that entered the log with `change`
    pub fn added_by(&self, change: &LogChange) -> &[RunEvent] {
        let count = change.new_events().min(self.events.len());
        &self.events[self.events.len() - count..]
    }

    pub fn steps(&self) -> BTreeMap<String, StepState> {
        reduce(&self.events)
    }

    pub fn metadata(&self) -> RunMetadata {
        extract_metadata(&self.events)
    }

    pub fn logs_view(&self, filter: &LogFilter, selection: &HashSet<String>) -> LogsView<'_> {
        let filtered = filter_logs(&self.events, filter, selection);
        LogsView {
            display: filtered.display,
            search_matches: filtered.search_matches,
            has_text_filter: filtered.has_text_filter,
            loaded: self.loaded,
        }
    }
}
