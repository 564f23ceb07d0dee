use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sluice_core::materializations::{aggregate, AggregatedMaterializations, AggregationOptions};
use sluice_schemas::{MaterializationRecord, XAxis};
use tracing::info;

/// Accepted layouts of a materialization record file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<MaterializationRecord>),
    Wrapped { records: Vec<MaterializationRecord> },
}

/// Load a bounded set of materialization records from a json file
pub fn load_records(path: &Path) -> Result<Vec<MaterializationRecord>, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file: RecordFile = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse materialization records in {}", path.display()))?;

    let records = match file {
        RecordFile::List(records) | RecordFile::Wrapped { records } => records,
    };
    info!("Loaded {} materialization records", records.len());
    Ok(records)
}

/// Aggregate the records of `path` and print buckets and series ranges
pub fn run_materializations(path: &Path, options: AggregationOptions) -> Result<(), anyhow::Error> {
    let records = load_records(path)?;
    let aggregated = aggregate(&records, &options);
    print!("{}", render(&aggregated));
    Ok(())
}

fn render(aggregated: &AggregatedMaterializations) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Partitions ({}):", aggregated.buckets.len());
    for bucket in &aggregated.buckets {
        let _ = writeln!(
            out,
            "  {:<24} latest run {} at {} ({} earlier)",
            bucket.partition.as_deref().unwrap_or("<unpartitioned>"),
            bucket.latest.run_id,
            bucket.latest.timestamp,
            bucket.predecessors.len()
        );
    }

    let _ = writeln!(out, "Series ({}):", aggregated.series.len());
    for (label, series) in &aggregated.series {
        let axis = match series.x_axis {
            XAxis::Time => "time",
            XAxis::Partition => "partition",
        };
        let numeric = series.values.iter().filter(|point| !point.y.is_nan()).count();
        let range = match (series.min_y, series.max_y) {
            (Some(min), Some(max)) => format!("{min} .. {max}"),
            _ => "no numeric values".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:<24} {} points ({} numeric) over {}, {}",
            label,
            series.values.len(),
            numeric,
            axis,
            range
        );
    }

    out
}
