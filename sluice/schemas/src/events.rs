//! Run event types.
//!
//! A run produces an ordered log of [`RunEvent`]s. Every event shares a common
//! envelope (run id, timestamp, step key, level, message) and carries a
//! [`EventKind`] payload that is specific to the kind of event.

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataEntry;
use crate::serde_helpers::{default_true, deserialize_timestamp, serialize_timestamp};

/// Severity of a run event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// All levels, most severe first
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Critical,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a log level name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLogLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(LogLevel::Critical),
            "ERROR" => Ok(LogLevel::Error),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

/// One structured record in a run's log
///
/// # Examples
///
/// ```
/// use sluice_schemas::{EventKind, LogLevel, RunEvent};
///
/// let event = RunEvent::builder()
///     .run_id("run-1".to_string())
///     .timestamp(1_700_000_000_000)
///     .step_key("extract".to_string())
///     .kind(EventKind::StepStart)
///     .build();
///
/// assert_eq!(event.level, LogLevel::Info);
/// assert_eq!(event.kind.type_name(), "ExecutionStepStartEvent");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct RunEvent {
    /// Id of the run that produced this event
    pub run_id: String,

    /// Milliseconds since the unix epoch, transported as a numeric string
    #[serde(
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp"
    )]
    pub timestamp: i64,

    /// Step that emitted the event, absent for run-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,

    /// Severity of the event
    #[serde(default = "default_level")]
    #[builder(default = LogLevel::Info)]
    pub level: LogLevel,

    /// Free text message
    #[serde(default)]
    #[builder(default)]
    pub message: String,

    /// Event specific payload
    #[serde(flatten)]
    pub kind: EventKind,
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

/// Kind specific payload of a [`RunEvent`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Run was placed in the run queue
    RunEnqueued,
    /// Run was taken off the run queue
    RunDequeued,
    /// Run worker is being launched
    RunStarting,
    /// Run execution started
    RunStart,
    RunSuccess,
    RunFailure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
    /// Run failed before any step could be executed
    RunInitFailure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
    RunCanceling,
    RunCanceled,

    /// Run process is being spawned
    ProcessStart,
    /// Run process is up
    ProcessStarted {
        process_id: u32,
    },
    /// Run process has exited
    ProcessExited {
        process_id: u32,
    },

    /// Engine level event, optionally opening or closing a timing marker
    EngineEvent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        marker_start: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        marker_end: Option<String>,
    },

    StepStart,
    StepSuccess,
    StepFailure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
    StepSkipped,
    StepInput {
        input_name: String,
    },
    StepOutput {
        output_name: String,
    },

    /// A step produced a data asset
    Materialization {
        materialization: Materialization,
    },
    /// A step evaluated a data quality expectation
    ExpectationResult {
        expectation_result: ExpectationResult,
    },

    /// Plain user or framework log line
    LogMessage,
}

impl EventKind {
    /// Display name of the event type, matched by `type:` filter tokens
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::RunEnqueued => "RunEnqueuedEvent",
            EventKind::RunDequeued => "RunDequeuedEvent",
            EventKind::RunStarting => "RunStartingEvent",
            EventKind::RunStart => "RunStartEvent",
            EventKind::RunSuccess => "RunSuccessEvent",
            EventKind::RunFailure { .. } => "RunFailureEvent",
            EventKind::RunInitFailure { .. } => "RunInitFailureEvent",
            EventKind::RunCanceling => "RunCancelingEvent",
            EventKind::RunCanceled => "RunCanceledEvent",
            EventKind::ProcessStart => "ProcessStartEvent",
            EventKind::ProcessStarted { .. } => "ProcessStartedEvent",
            EventKind::ProcessExited { .. } => "ProcessExitedEvent",
            EventKind::EngineEvent { .. } => "EngineEvent",
            EventKind::StepStart => "ExecutionStepStartEvent",
            EventKind::StepSuccess => "ExecutionStepSuccessEvent",
            EventKind::StepFailure { .. } => "ExecutionStepFailureEvent",
            EventKind::StepSkipped => "ExecutionStepSkippedEvent",
            EventKind::StepInput { .. } => "ExecutionStepInputEvent",
            EventKind::StepOutput { .. } => "ExecutionStepOutputEvent",
            EventKind::Materialization { .. } => "MaterializationEvent",
            EventKind::ExpectationResult { .. } => "ExpectationResultEvent",
            EventKind::LogMessage => "LogMessageEvent",
        }
    }
}

/// Serializable error details attached to failure events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default)]
    pub stack: Vec<String>,
}

/// A data asset produced by a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
pub struct Materialization {
    /// Asset label, e.g. `warehouse.orders`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    #[builder(default)]
    pub metadata_entries: Vec<MetadataEntry>,
}

/// Outcome of a data quality expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ExpectationResult {
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    #[builder(default)]
    pub metadata_entries: Vec<MetadataEntry>,
}
