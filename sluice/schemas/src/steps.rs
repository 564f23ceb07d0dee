//! Derived per-step and per-run state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::{ExpectationResult, Materialization};

/// Execution state of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Waiting,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

impl StepStatus {
    /// Returns true if no further transitions are expected
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Skipped | StepStatus::Failed
        )
    }
}

/// Timing marker opened and closed by engine events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpan {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// State of one step derived from a run's event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StepState {
    pub key: String,
    pub state: StepStatus,
    /// Timestamp of the step start event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    /// Milliseconds between start and the terminal event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<i64>,
    /// Timestamp of the latest state transition
    pub transitioned_at: i64,
    #[serde(default)]
    pub expectation_results: Vec<ExpectationResult>,
    #[serde(default)]
    pub materializations: Vec<Materialization>,
    #[serde(default)]
    pub markers: Vec<MarkerSpan>,
}

impl StepState {
    /// Fresh record in the `WAITING` state
    pub fn waiting(key: impl Into<String>, transitioned_at: i64) -> Self {
        Self::with_state(key, StepStatus::Waiting, transitioned_at)
    }

    /// Fresh record in the given state with no accumulated payloads
    pub fn with_state(key: impl Into<String>, state: StepStatus, transitioned_at: i64) -> Self {
        Self {
            key: key.into(),
            state,
            start: None,
            elapsed: None,
            transitioned_at,
            expectation_results: Vec::new(),
            materializations: Vec::new(),
            markers: Vec::new(),
        }
    }
}

/// Run level metadata derived from a run's event log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_process_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_process_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_pipeline_at: Option<i64>,
    /// Set by the first terminal run level event only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub init_failed: bool,
    /// Markers emitted by engine events without a step key
    #[serde(default)]
    pub global_markers: Vec<MarkerSpan>,
    pub steps: BTreeMap<String, StepState>,
}
