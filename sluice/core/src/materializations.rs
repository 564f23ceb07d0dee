//! Aggregation of historical materializations into partition buckets and
//! numeric metadata series.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sluice_schemas::{
    HistoricalMaterialization, MaterializationRecord, MetadataValue, NumericSeries, SeriesPoint,
    XAxis,
};
use tracing::{debug, warn};

/// Label of the derived series holding step durations
pub const STEP_EXECUTION_TIME_LABEL: &str = "Step Execution Time";

/// Knobs for [`aggregate`]
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOptions {
    /// Bucket records by partition key. Disabled, every record is its own bucket.
    pub group_by_partition: bool,
    pub x_axis: XAxis,
    /// Ordered partition key space for partition mode x values. Defaults to the
    /// sorted set of observed keys.
    pub partition_order: Option<Vec<String>>,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            group_by_partition: true,
            x_axis: XAxis::Time,
            partition_order: None,
        }
    }
}

/// Everything derived from one bounded set of historical records
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedMaterializations {
    pub buckets: Vec<HistoricalMaterialization>,
    pub series: BTreeMap<String, NumericSeries>,
}

pub fn aggregate(
    records: &[MaterializationRecord],
    options: &AggregationOptions,
) -> AggregatedMaterializations {
    AggregatedMaterializations {
        buckets: group_by_partition(records, options.group_by_partition),
        series: extract_numeric_series(records, options),
    }
}

/// Bucket records by partition key.
///
/// Buckets come out in descending partition key order, with the bucket of
/// unpartitioned records last. Within a bucket the newest record is `latest`
/// and the rest follow newest first. Records with equal timestamps keep their
/// input order.
pub fn group_by_partition(
    records: &[MaterializationRecord],
    enabled: bool,
) -> Vec<HistoricalMaterialization> {
    if !enabled {
        return records
            .iter()
            .map(|record| HistoricalMaterialization {
                partition: record.partition.clone(),
                latest: record.clone(),
                predecessors: Vec::new(),
            })
            .collect();
    }

    let mut partitioned: BTreeMap<&str, Vec<&MaterializationRecord>> = BTreeMap::new();
    let mut unpartitioned = Vec::new();
    for record in records {
        match record.partition.as_deref() {
            Some(partition) => partitioned.entry(partition).or_default().push(record),
            None => unpartitioned.push(record),
        }
    }

    let mut buckets: Vec<HistoricalMaterialization> = partitioned
        .into_iter()
        .rev()
        .filter_map(|(partition, bucket)| into_bucket(Some(partition.to_string()), bucket))
        .collect();
    buckets.extend(into_bucket(None, unpartitioned));
    buckets
}

fn into_bucket(
    partition: Option<String>,
    mut records: Vec<&MaterializationRecord>,
) -> Option<HistoricalMaterialization> {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let mut records = records.into_iter().cloned();
    let latest = records.next()?;

    Some(HistoricalMaterialization {
        partition,
        latest,
        predecessors: records.collect(),
    })
}

/// Union of the numeric metadata labels across all records
pub fn numeric_labels(records: &[MaterializationRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|record| &record.materialization.metadata_entries)
        .filter(|entry| entry.value.is_numeric())
        .map(|entry| entry.label.clone())
        .collect()
}

/// Build one series per numeric metadata label plus the step duration series.
///
/// Under [`XAxis::Time`] every label gets exactly one point per record, `NaN`
/// where the record lacks the label. Under [`XAxis::Partition`] records sharing
/// a partition collapse onto one point which keeps the first non-`NaN` value.
pub fn extract_numeric_series(
    records: &[MaterializationRecord],
    options: &AggregationOptions,
) -> BTreeMap<String, NumericSeries> {
    let mut labels = numeric_labels(records);
    labels.insert(STEP_EXECUTION_TIME_LABEL.to_string());

    let positions = partition_positions(records, options.partition_order.as_deref());

    labels
        .into_iter()
        .map(|label| {
            let mut series = NumericSeries::new(label.clone(), options.x_axis);
            let mut by_x: HashMap<u64, usize> = HashMap::new();

            for record in records {
                let Some(x) = x_value(record, options.x_axis, &positions) else {
                    continue;
                };
                let y = y_value(record, &label);

                match options.x_axis {
                    XAxis::Time => series.values.push(SeriesPoint { x, y }),
                    XAxis::Partition => match by_x.get(&x.to_bits()) {
                        Some(&index) => {
                            let point = &mut series.values[index];
                            if point.y.is_nan() && !y.is_nan() {
                                point.y = y;
                            }
                        }
                        None => {
                            by_x.insert(x.to_bits(), series.values.len());
                            series.values.push(SeriesPoint { x, y });
                        }
                    },
                }
            }

            update_bounds(&mut series);
            (label, series)
        })
        .collect()
}

fn partition_positions(
    records: &[MaterializationRecord],
    order: Option<&[String]>,
) -> HashMap<String, usize> {
    match order {
        Some(order) => order
            .iter()
            .enumerate()
            .map(|(index, key)| (key.clone(), index))
            .collect(),
        None => records
            .iter()
            .filter_map(|record| record.partition.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(index, key)| (key.to_string(), index))
            .collect(),
    }
}

fn x_value(
    record: &MaterializationRecord,
    x_axis: XAxis,
    positions: &HashMap<String, usize>,
) -> Option<f64> {
    match x_axis {
        XAxis::Time => Some(record.timestamp as f64),
        XAxis::Partition => {
            let partition = record.partition.as_ref()?;
            match positions.get(partition) {
                Some(&index) => Some(index as f64),
                None => {
                    debug!(%partition, "Partition outside the partition key space, skipping");
                    None
                }
            }
        }
    }
}

fn y_value(record: &MaterializationRecord, label: &str) -> f64 {
    if label == STEP_EXECUTION_TIME_LABEL {
        return match record.step_stats {
            Some(stats) => match (stats.start_time, stats.end_time) {
                (Some(start), Some(end)) => end - start,
                _ => f64::NAN,
            },
            None => f64::NAN,
        };
    }

    let entry = record
        .materialization
        .metadata_entries
        .iter()
        .find(|entry| entry.label == label && entry.value.is_numeric());

    match entry.map(|entry| &entry.value) {
        Some(MetadataValue::Int {
            int_value: Some(value),
            ..
        }) => *value as f64,
        // beyond 53 bits, precision loss accepted
        Some(MetadataValue::Int {
            int_value: None,
            int_repr,
        }) => int_repr.trim().parse::<f64>().unwrap_or_else(|_| {
            warn!(label, %int_repr, "Unparseable integer metadata value");
            f64::NAN
        }),
        Some(MetadataValue::Float { float_value }) => float_value.unwrap_or(f64::NAN),
        Some(
            MetadataValue::Text { .. }
            | MetadataValue::Url { .. }
            | MetadataValue::Path { .. }
            | MetadataValue::Json { .. }
            | MetadataValue::Markdown { .. },
        )
        | None => f64::NAN,
    }
}

fn update_bounds(series: &mut NumericSeries) {
    let numeric = series.values.iter().filter(|point| !point.y.is_nan());
    for point in numeric {
        series.min_x = Some(series.min_x.map_or(point.x, |min| min.min(point.x)));
        series.max_x = Some(series.max_x.map_or(point.x, |max| max.max(point.x)));
        series.min_y = Some(series.min_y.map_or(point.y, |min| min.min(point.y)));
        series.max_y = Some(series.max_y.map_or(point.y, |max| max.max(point.y)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sluice_schemas::{Materialization, MetadataEntry, StepStats};

    fn record(partition: Option<&str>, timestamp: i64) -> MaterializationRecord {
        MaterializationRecord::builder()
            .run_id(format!("run-{timestamp}"))
            .maybe_partition(partition.map(str::to_string))
            .timestamp(timestamp)
            .build()
    }

    fn with_metric(mut record: MaterializationRecord, label: &str, value: f64) -> MaterializationRecord {
        record.materialization.metadata_entries.push(
            MetadataEntry::builder()
                .label(label.to_string())
                .value(MetadataValue::Float {
                    float_value: Some(value),
                })
                .build(),
        );
        record
    }

    fn timestamps(records: &[MaterializationRecord]) -> Vec<i64> {
        records.iter().map(|record| record.timestamp).collect()
    }

    #[test]
    fn buckets_by_partition_descending() {
        let records = vec![
            record(Some("p1"), 10),
            record(Some("p1"), 20),
            record(Some("p2"), 5),
        ];

        let buckets = group_by_partition(&records, true);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].partition.as_deref(), Some("p2"));
        assert_eq!(buckets[0].latest.timestamp, 5);
        assert!(buckets[0].predecessors.is_empty());
        assert_eq!(buckets[1].partition.as_deref(), Some("p1"));
        assert_eq!(buckets[1].latest.timestamp, 20);
        assert_eq!(timestamps(&buckets[1].predecessors), vec![10]);
    }

    #[test]
    fn unpartitioned_bucket_is_last() {
        let records = vec![
            record(None, 1),
            record(Some("a"), 2),
            record(None, 3),
            record(Some("b"), 4),
        ];

        let buckets = group_by_partition(&records, true);

        let partitions: Vec<_> = buckets.iter().map(|b| b.partition.as_deref()).collect();
        assert_eq!(partitions, vec![Some("b"), Some("a"), None]);
        assert_eq!(buckets[2].latest.timestamp, 3);
        assert_eq!(timestamps(&buckets[2].predecessors), vec![1]);
    }

    #[test]
    fn predecessors_descend() {
        let records: Vec<_> = [7, 3, 9, 1, 5]
            .into_iter()
            .map(|ts| record(Some("p"), ts))
            .collect();

        let buckets = group_by_partition(&records, true);

        assert_eq!(buckets[0].latest.timestamp, 9);
        assert_eq!(timestamps(&buckets[0].predecessors), vec![7, 5, 3, 1]);
    }

    #[test]
    fn grouping_disabled_keeps_input_order() {
        let records = vec![record(Some("p1"), 10), record(Some("p1"), 20), record(None, 5)];

        let buckets = group_by_partition(&records, false);

        assert_eq!(buckets.len(), 3);
        let latest: Vec<_> = buckets.iter().map(|b| b.latest.timestamp).collect();
        assert_eq!(latest, vec![10, 20, 5]);
        assert!(buckets.iter().all(|b| b.predecessors.is_empty()));
    }

    #[test]
    fn empty_input() {
        let aggregated = aggregate(&[], &AggregationOptions::default());

        assert!(aggregated.buckets.is_empty());
        let duration = &aggregated.series[STEP_EXECUTION_TIME_LABEL];
        assert!(duration.values.is_empty());
        assert_eq!(duration.min_y, None);
        assert_eq!(duration.max_x, None);
    }

    #[test]
    fn time_series_align_with_records() {
        let records = vec![
            with_metric(record(None, 1), "rows", 10.0),
            record(None, 2),
            with_metric(record(None, 3), "rows", 30.0),
        ];

        let series = extract_numeric_series(&records, &AggregationOptions::default());
        let rows = &series["rows"];

        assert_eq!(rows.values.len(), records.len());
        assert!(rows.values[1].y.is_nan());
        assert_eq!(rows.min_y, Some(10.0));
        assert_eq!(rows.max_y, Some(30.0));
        assert_eq!(rows.min_x, Some(1.0));
        assert_eq!(rows.max_x, Some(3.0));
    }

    #[test]
    fn non_numeric_labels_are_ignored() {
        let mut text = record(None, 1);
        text.materialization = Materialization::builder()
            .metadata_entries(vec![MetadataEntry::builder()
                .label("path".to_string())
                .value(MetadataValue::Path {
                    path: "/tmp/out".to_string(),
                })
                .build()])
            .build();

        let labels = numeric_labels(&[text]);

        assert!(labels.is_empty());
    }

    #[rstest]
    #[case(Some(1024), "1024", 1024.0)]
    #[case(None, "9007199254740993", 9007199254740992.0)]
    #[case(None, "not a number", f64::NAN)]
    fn int_coercion(#[case] int_value: Option<i64>, #[case] int_repr: &str, #[case] expected: f64) {
        let mut rec = record(None, 1);
        rec.materialization.metadata_entries.push(
            MetadataEntry::builder()
                .label("rows".to_string())
                .value(MetadataValue::Int {
                    int_value,
                    int_repr: int_repr.to_string(),
                })
                .build(),
        );

        let y = y_value(&rec, "rows");

        if expected.is_nan() {
            assert!(y.is_nan());
        } else {
            assert_eq!(y, expected);
        }
    }

    #[rstest]
    #[case(Some(StepStats { start_time: Some(1.5), end_time: Some(4.0) }), 2.5)]
    #[case(Some(StepStats { start_time: Some(1.5), end_time: None }), f64::NAN)]
    #[case(None, f64::NAN)]
    fn step_duration(#[case] stats: Option<StepStats>, #[case] expected: f64) {
        let mut rec = record(None, 1);
        rec.step_stats = stats;

        let y = y_value(&rec, STEP_EXECUTION_TIME_LABEL);

        if expected.is_nan() {
            assert!(y.is_nan());
        } else {
            assert_eq!(y, expected);
        }
    }

    #[test]
    fn partition_mode_keeps_first_numeric_value() {
        let records = vec![
            record(Some("b"), 1),
            with_metric(record(Some("b"), 2), "rows", 20.0),
            with_metric(record(Some("b"), 3), "rows", 30.0),
            with_metric(record(Some("a"), 4), "rows", 5.0),
            record(None, 5),
        ];
        let options = AggregationOptions {
            x_axis: XAxis::Partition,
            ..AggregationOptions::default()
        };

        let series = extract_numeric_series(&records, &options);
        let rows = &series["rows"];

        assert_eq!(
            rows.values,
            vec![SeriesPoint { x: 1.0, y: 20.0 }, SeriesPoint { x: 0.0, y: 5.0 }]
        );
        assert_eq!(rows.x_axis, XAxis::Partition);
    }

    #[test]
    fn partition_order_drives_x() {
        let records = vec![
            with_metric(record(Some("2024-01-02"), 1), "rows", 2.0),
            with_metric(record(Some("2023-12-31"), 2), "rows", 1.0),
        ];
        let options = AggregationOptions {
            x_axis: XAxis::Partition,
            partition_order: Some(vec![
                "2024-01-01".to_string(),
                "2024-01-02".to_string(),
            ]),
            ..AggregationOptions::default()
        };

        let series = extract_numeric_series(&records, &options);

        assert_eq!(series["rows"].values, vec![SeriesPoint { x: 1.0, y: 2.0 }]);
    }
}
