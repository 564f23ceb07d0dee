//! Commonly used types and functions.
//!
//! `use sluice_core::prelude::*;` brings in everything needed to follow a run.

pub use crate::config::{ConfigError, StreamConfig};
pub use crate::error::{Error, Result, TransportError};

pub use crate::stream::{
    EventBatch, EventStreamClient, StreamUpdate, SubscriptionFailure, SubscriptionHandle,
    SubscriptionTransport, TransportEvent,
};

pub use crate::log_filter::{filter_logs, parse_query, resolve_selection, StepSelectionResolver};
pub use crate::materializations::{aggregate, AggregatedMaterializations, AggregationOptions};
pub use crate::run_log::{LogChange, LogsView, RunLog};
pub use crate::run_status::{InMemoryRunStore, RunRecordStore, RunStatusSync};
pub use crate::step_state::{extract_metadata, reduce};
pub use crate::watcher::{RunWatcher, WatchUpdate};
