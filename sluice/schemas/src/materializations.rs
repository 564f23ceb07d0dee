//! Historical materialization records and the aggregated views built from them.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::events::Materialization;
use crate::serde_helpers::{deserialize_timestamp, serialize_timestamp};

/// Execution timing of the step that produced a materialization, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

/// One historical materialization of an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct MaterializationRecord {
    pub run_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,

    /// Partition the asset was materialized for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    #[serde(
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp"
    )]
    pub timestamp: i64,

    #[serde(default)]
    #[builder(default)]
    pub materialization: Materialization,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_stats: Option<StepStats>,
}

/// The latest materialization of a partition and everything that came before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMaterialization {
    /// Partition key of the bucket, absent for unpartitioned records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    pub latest: MaterializationRecord,
    /// Older records, newest first
    #[serde(default)]
    pub predecessors: Vec<MaterializationRecord>,
}

/// What the x value of a series point represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XAxis {
    /// Materialization timestamp in millis
    Time,
    /// Position of the partition in the partition key space
    Partition,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub x: f64,
    /// `NaN` when the record carried no usable value for the label
    pub y: f64,
}

/// Numeric values of one metadata label across a set of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSeries {
    pub label: String,
    pub x_axis: XAxis,
    pub values: Vec<SeriesPoint>,
    /// Range bounds, `None` when the series has no numeric values
    pub min_x: Option<f64>,
    pub max_x: Option<f64>,
    pub min_y: Option<f64>,
    pub max_y: Option<f64>,
}

impl NumericSeries {
    pub fn new(label: impl Into<String>, x_axis: XAxis) -> Self {
        Self {
            label: label.into(),
            x_axis,
            values: Vec::new(),
            min_x: None,
            max_x: None,
            min_y: None,
            max_y: None,
        }
    }
}
