//! # Sluice Schemas
//!
//! This crate contains the data model shared throughout the sluice workspace:
//! the run events streamed by the orchestrator, the step and run state derived
//! from them, the log filter descriptor, and the historical materialization
//! records together with the views aggregated from them. Keeping these types in
//! one place lets the protocol, core and CLI crates agree on a single wire
//! format.

pub mod events;
pub mod filter;
pub mod materializations;
pub mod metadata;
pub mod run;
pub mod steps;

mod serde_helpers;

// Re-export the main types for convenience
pub use events::{
    ErrorInfo, EventKind, ExpectationResult, LogLevel, Materialization, RunEvent, UnknownLogLevel,
};
pub use filter::{FilterToken, LogFilter, TokenKind};
pub use materializations::{
    HistoricalMaterialization, MaterializationRecord, NumericSeries, SeriesPoint, StepStats, XAxis,
};
pub use metadata::{MetadataEntry, MetadataValue};
pub use run::{RunStatus, RunStatusRecord};
pub use steps::{MarkerSpan, RunMetadata, StepState, StepStatus};
