//! Integration tests for sluice schemas
//!
//! Tests the wire format of events and materialization records as produced by the orchestrator.

use sluice_schemas::*;

#[test]
fn test_step_event_from_wire() {
    let json = r#"{
        "type": "step_start",
        "run_id": "8c1f",
        "timestamp": "1700000000100",
        "step_key": "extract",
        "level": "DEBUG",
        "message": "Started execution of step \"extract\"."
    }"#;

    let event: RunEvent = serde_json::from_str(json).unwrap();
    assert_eq!(event.kind, EventKind::StepStart);
    assert_eq!(event.timestamp, 1_700_000_000_100);
    assert_eq!(event.step_key.as_deref(), Some("extract"));
    assert_eq!(event.level, LogLevel::Debug);
}

#[test]
fn test_envelope_defaults() {
    // level and message are optional on the wire
    let json = r#"{"type": "run_enqueued", "run_id": "8c1f", "timestamp": 5}"#;

    let event: RunEvent = serde_json::from_str(json).unwrap();
    assert_eq!(event.kind, EventKind::RunEnqueued);
    assert_eq!(event.level, LogLevel::Info);
    assert!(event.message.is_empty());
    assert!(event.step_key.is_none());
}

#[test]
fn test_materialization_event_payload() {
    let json = r#"{
        "type": "materialization",
        "run_id": "8c1f",
        "timestamp": "20",
        "step_key": "load",
        "materialization": {
            "label": "warehouse.orders",
            "metadata_entries": [
                {"label": "rows", "type": "int", "int_value": 12, "int_repr": "12"},
                {"label": "bytes", "type": "float", "float_value": 1.5},
                {"label": "path", "type": "path", "path": "/tmp/orders"}
            ]
        }
    }"#;

    let event: RunEvent = serde_json::from_str(json).unwrap();
    let EventKind::Materialization { materialization } = &event.kind else {
        panic!("expected materialization, got {:?}", event.kind);
    };

    assert_eq!(materialization.label.as_deref(), Some("warehouse.orders"));
    let numeric = materialization
        .metadata_entries
        .iter()
        .filter(|entry| entry.value.is_numeric())
        .count();
    assert_eq!(numeric, 2);
}

#[test]
fn test_process_and_marker_events() {
    let started: RunEvent = serde_json::from_str(
        r#"{"type": "process_started", "run_id": "r", "timestamp": "3", "process_id": 4242}"#,
    )
    .unwrap();
    assert_eq!(started.kind, EventKind::ProcessStarted { process_id: 4242 });

    let marker: RunEvent = serde_json::from_str(
        r#"{"type": "engine_event", "run_id": "r", "timestamp": "4", "marker_start": "resources"}"#,
    )
    .unwrap();
    assert_eq!(
        marker.kind,
        EventKind::EngineEvent {
            marker_start: Some("resources".to_string()),
            marker_end: None
        }
    );
}

#[test]
fn test_event_roundtrip_keeps_string_timestamp() {
    let event = RunEvent::builder()
        .run_id("r".to_string())
        .timestamp(150)
        .step_key("a".to_string())
        .kind(EventKind::StepFailure {
            error: Some(ErrorInfo {
                message: "boom".to_string(),
                stack: vec![],
            }),
        })
        .build();

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""timestamp":"150""#));
    assert!(json.contains(r#""type":"step_failure""#));

    let parsed: RunEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}

#[test]
fn test_materialization_record_from_wire() {
    let json = r#"{
        "run_id": "r1",
        "partition": "2024-01-01",
        "timestamp": "1000",
        "materialization": {"metadata_entries": []},
        "step_stats": {"start_time": 10.0, "end_time": 12.5}
    }"#;

    let record: MaterializationRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.partition.as_deref(), Some("2024-01-01"));
    assert_eq!(record.timestamp, 1000);
    assert_eq!(record.step_stats.and_then(|s| s.end_time), Some(12.5));
}

#[test]
fn test_log_level_parsing() {
    assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
    assert_eq!("Info".parse::<LogLevel>().unwrap(), LogLevel::Info);

    let error = "verbose".parse::<LogLevel>().unwrap_err();
    assert_eq!(error, UnknownLogLevel("verbose".to_string()));
    assert_eq!(error.to_string(), "unknown log level: verbose");

    let boxed: Box<dyn std::error::Error> = Box::new(error);
    assert!(boxed.source().is_none());
}
