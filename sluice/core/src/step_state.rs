//! Step and run state derived from a run's event log.
//!
//! Derivation is a pure fold over the complete, ordered log. Nothing is mutated
//! incrementally: callers recompute from the authoritative log after every
//! batch, so replaying a log always yields the state of the original pass.

use std::collections::BTreeMap;

use sluice_schemas::{EventKind, MarkerSpan, RunEvent, RunMetadata, StepState, StepStatus};
use tracing::warn;

/// Derive the state of every step that appears in `events`.
///
/// Pure and infallible: malformed sequences, such as a success without a prior
/// start, degrade to partial records instead of aborting the fold.
///
/// # Examples
///
/// ```
/// use sluice_core::step_state::reduce;
/// use sluice_schemas::{EventKind, RunEvent, StepStatus};
///
/// let event = |kind, timestamp| {
///     RunEvent::builder()
///         .run_id("run".to_string())
///         .step_key("a".to_string())
///         .timestamp(timestamp)
///         .kind(kind)
///         .build()
/// };
///
/// let steps = reduce(&[event(EventKind::StepStart, 100), event(EventKind::StepSuccess, 150)]);
///
/// let a = &steps["a"];
/// assert_eq!(a.state, StepStatus::Succeeded);
/// assert_eq!(a.start, Some(100));
/// assert_eq!(a.elapsed, Some(50));
/// assert_eq!(a.transitioned_at, 150);
/// ```
pub fn reduce(events: &[RunEvent]) -> BTreeMap<String, StepState> {
    let mut steps = BTreeMap::new();

    for event in events {
        if let Some(key) = event.step_key.as_deref() {
            apply_step_event(&mut steps, key, event);
        }
    }

    steps
}

fn apply_step_event(steps: &mut BTreeMap<String, StepState>, key: &str, event: &RunEvent) {
    let timestamp = event.timestamp;

    match &event.kind {
        EventKind::StepStart => {
            let mut state = StepState::with_state(key, StepStatus::Running, timestamp);
            state.start = Some(timestamp);
            steps.insert(key.to_string(), state);
        }
        EventKind::StepSuccess => finish_step(steps, key, StepStatus::Succeeded, timestamp),
        EventKind::StepFailure { .. } => finish_step(steps, key, StepStatus::Failed, timestamp),
        EventKind::StepSkipped => {
            // replaces the record, accumulated payloads included
            steps.insert(
                key.to_string(),
                StepState::with_state(key, StepStatus::Skipped, timestamp),
            );
        }
        EventKind::Materialization { materialization } => {
            step_entry(steps, key, timestamp)
                .materializations
                .push(materialization.clone());
        }
        EventKind::ExpectationResult { expectation_result } => {
            step_entry(steps, key, timestamp)
                .expectation_results
                .push(expectation_result.clone());
        }
        EventKind::EngineEvent {
            marker_start,
            marker_end,
        } => {
            if marker_start.is_some() || marker_end.is_some() {
                apply_marker(
                    &mut step_entry(steps, key, timestamp).markers,
                    marker_start.as_deref(),
                    marker_end.as_deref(),
                    timestamp,
                );
            }
        }
        EventKind::StepInput { .. }
        | EventKind::StepOutput { .. }
        | EventKind::LogMessage
        | EventKind::RunEnqueued
        | EventKind::RunDequeued
        | EventKind::RunStarting
        | EventKind::RunStart
        | EventKind::RunSuccess
        | EventKind::RunFailure { .. }
        | EventKind::RunInitFailure { .. }
        | EventKind::RunCanceling
        | EventKind::RunCanceled
        | EventKind::ProcessStart
        | EventKind::ProcessStarted { .. }
        | EventKind::ProcessExited { .. } => {}
    }
}

fn step_entry<'a>(
    steps: &'a mut BTreeMap<String, StepState>,
    key: &str,
    timestamp: i64,
) -> &'a mut StepState {
    steps
        .entry(key.to_string())
        .or_insert_with(|| StepState::waiting(key, timestamp))
}

fn finish_step(
    steps: &mut BTreeMap<String, StepState>,
    key: &str,
    status: StepStatus,
    timestamp: i64,
) {
    let state = step_entry(steps, key, timestamp);
    state.state = status;

    match state.start {
        Some(start) => {
            state.elapsed = timestamp.checked_sub(start);
            if state.elapsed.is_none() {
                warn!(step_key = key, start, timestamp, "Step elapsed time out of range");
            }
            state.transitioned_at = timestamp;
        }
        None => warn!(step_key = key, "Step finished without a recorded start"),
    }
}

// marker_start opens (or reopens) a span, marker_end closes the latest span with that key
fn apply_marker(
    markers: &mut Vec<MarkerSpan>,
    marker_start: Option<&str>,
    marker_end: Option<&str>,
    timestamp: i64,
) {
    if let Some(key) = marker_start {
        markers.push(MarkerSpan {
            key: key.to_string(),
            start: Some(timestamp),
            end: None,
        });
    }

    if let Some(key) = marker_end {
        match markers
            .iter_mut()
            .rev()
            .find(|marker| marker.key == key && marker.end.is_none())
        {
            Some(marker) => marker.end = Some(timestamp),
            None => markers.push(MarkerSpan {
                key: key.to_string(),
                start: None,
                end: Some(timestamp),
            }),
        }
    }
}

/// Derive run level metadata, including every step's state, from `events`.
///
/// `exited_at` is taken from the first terminal run level event; later ones
/// do not move it.
pub fn extract_metadata(events: &[RunEvent]) -> RunMetadata {
    let mut metadata = RunMetadata::default();

    for event in events {
        let timestamp = event.timestamp;

        match &event.kind {
            EventKind::ProcessStart => metadata.starting_process_at = Some(timestamp),
            EventKind::ProcessStarted { process_id } => {
                metadata.started_process_at = Some(timestamp);
                metadata.process_id = Some(*process_id);
            }
            EventKind::RunStart => metadata.started_pipeline_at = Some(timestamp),
            EventKind::RunInitFailure { .. } => {
                metadata.init_failed = true;
                metadata.exited_at.get_or_insert(timestamp);
            }
            EventKind::RunSuccess
            | EventKind::RunFailure { .. }
            | EventKind::RunCanceled
            | EventKind::ProcessExited { .. } => {
                metadata.exited_at.get_or_insert(timestamp);
            }
            EventKind::EngineEvent {
                marker_start,
                marker_end,
            } if event.step_key.is_none() => apply_marker(
                &mut metadata.global_markers,
                marker_start.as_deref(),
                marker_end.as_deref(),
                timestamp,
            ),
            EventKind::EngineEvent { .. }
            | EventKind::RunEnqueued
            | EventKind::RunDequeued
            | EventKind::RunStarting
            | EventKind::RunCanceling
            | EventKind::StepStart
            | EventKind::StepSuccess
            | EventKind::StepFailure { .. }
            | EventKind::StepSkipped
            | EventKind::StepInput { .. }
            | EventKind::StepOutput { .. }
            | EventKind::Materialization { .. }
            | EventKind::ExpectationResult { .. }
            | EventKind::LogMessage => {}
        }
    }

    metadata.steps = reduce(events);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sluice_schemas::{ExpectationResult, Materialization};

    fn step_event(kind: EventKind, key: &str, timestamp: i64) -> RunEvent {
        RunEvent::builder()
            .run_id("run".to_string())
            .step_key(key.to_string())
            .timestamp(timestamp)
            .kind(kind)
            .build()
    }

    fn run_event(kind: EventKind, timestamp: i64) -> RunEvent {
        RunEvent::builder()
            .run_id("run".to_string())
            .timestamp(timestamp)
            .kind(kind)
            .build()
    }

    fn materialization(label: &str) -> EventKind {
        EventKind::Materialization {
            materialization: Materialization::builder().label(label.to_string()).build(),
        }
    }

    #[test]
    fn start_then_success_records_elapsed() {
        let steps = reduce(&[
            step_event(EventKind::StepStart, "a", 100),
            step_event(EventKind::StepSuccess, "a", 150),
        ]);

        let a = &steps["a"];
        assert_eq!(a.state, StepStatus::Succeeded);
        assert_eq!(a.start, Some(100));
        assert_eq!(a.elapsed, Some(50));
        assert_eq!(a.transitioned_at, 150);
    }

    #[rstest]
    #[case(EventKind::StepSuccess, StepStatus::Succeeded)]
    #[case(EventKind::StepFailure { error: None }, StepStatus::Failed)]
    fn terminal_without_start_sets_state_only(#[case] kind: EventKind, #[case] expected: StepStatus) {
        let steps = reduce(&[step_event(kind, "orphan", 70)]);

        let orphan = &steps["orphan"];
        assert_eq!(orphan.state, expected);
        assert_eq!(orphan.start, None);
        assert_eq!(orphan.elapsed, None);
    }

    #[test]
    fn out_of_range_timestamps_leave_elapsed_unset() {
        let events: Vec<RunEvent> = serde_json::from_str(
            r#"[
                {"run_id": "run", "type": "step_start", "timestamp": "9223372036854775807", "step_key": "a"},
                {"run_id": "run", "type": "step_success", "timestamp": "-5", "step_key": "a"},
                {"run_id": "run", "type": "step_start", "timestamp": "10", "step_key": "b"}
            ]"#,
        )
        .unwrap();

        let steps = reduce(&events);

        assert_eq!(steps["a"].state, StepStatus::Succeeded);
        assert_eq!(steps["a"].elapsed, None);
        assert_eq!(steps["a"].transitioned_at, -5);
        assert_eq!(steps["b"].state, StepStatus::Running);
    }

    #[test]
    fn terminal_states_survive_a_growing_log() {
        let events = vec![
            step_event(EventKind::StepStart, "a", 1),
            step_event(EventKind::StepStart, "b", 2),
            step_event(materialization("orders"), "a", 3),
            step_event(EventKind::StepSuccess, "a", 4),
            step_event(EventKind::StepSkipped, "c", 5),
            step_event(
                EventKind::ExpectationResult {
                    expectation_result: ExpectationResult::builder()
                        .label("non_null".to_string())
                        .build(),
                },
                "a",
                6,
            ),
            step_event(EventKind::StepFailure { error: None }, "b", 7),
            step_event(
                EventKind::EngineEvent {
                    marker_start: Some("teardown".to_string()),
                    marker_end: None,
                },
                "b",
                8,
            ),
            step_event(EventKind::LogMessage, "c", 9),
        ];

        let mut terminal: BTreeMap<String, StepStatus> = BTreeMap::new();
        for end in 0..=events.len() {
            let steps = reduce(&events[..end]);

            for (key, state) in &terminal {
                assert_eq!(steps[key].state, *state, "step {key} after {end} events");
            }
            for (key, step) in steps {
                if step.state.is_terminal() {
                    terminal.insert(key, step.state);
                }
            }
        }
        assert_eq!(terminal.len(), 3);
    }

    #[test]
    fn malformed_event_does_not_stop_the_fold() {
        let steps = reduce(&[
            step_event(EventKind::StepSuccess, "orphan", 10),
            step_event(EventKind::StepStart, "b", 20),
            step_event(EventKind::StepFailure { error: None }, "b", 45),
        ]);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps["b"].state, StepStatus::Failed);
        assert_eq!(steps["b"].elapsed, Some(25));
    }

    #[test]
    fn skip_discards_accumulated_payloads() {
        let steps = reduce(&[
            step_event(EventKind::StepStart, "a", 1),
            step_event(materialization("orders"), "a", 2),
            step_event(EventKind::StepSkipped, "a", 3),
        ]);

        let a = &steps["a"];
        assert_eq!(a.state, StepStatus::Skipped);
        assert_eq!(a.transitioned_at, 3);
        assert!(a.materializations.is_empty());
        assert_eq!(a.start, None);
    }

    #[test]
    fn payloads_append_without_touching_state() {
        let expectation = ExpectationResult::builder()
            .label("non_null".to_string())
            .build();
        let steps = reduce(&[
            step_event(EventKind::StepStart, "a", 1),
            step_event(materialization("orders"), "a", 2),
            step_event(materialization("customers"), "a", 3),
            step_event(
                EventKind::ExpectationResult {
                    expectation_result: expectation.clone(),
                },
                "a",
                4,
            ),
        ]);

        let a = &steps["a"];
        assert_eq!(a.state, StepStatus::Running);
        assert_eq!(a.transitioned_at, 1);
        let labels: Vec<_> = a
            .materializations
            .iter()
            .filter_map(|m| m.label.as_deref())
            .collect();
        assert_eq!(labels, vec!["orders", "customers"]);
        assert_eq!(a.expectation_results, vec![expectation]);
    }

    #[test]
    fn payload_before_start_creates_waiting_record() {
        let steps = reduce(&[step_event(materialization("orders"), "late", 9)]);

        let late = &steps["late"];
        assert_eq!(late.state, StepStatus::Waiting);
        assert_eq!(late.materializations.len(), 1);
    }

    #[test]
    fn reduce_is_deterministic() {
        let events = vec![
            step_event(EventKind::StepStart, "b", 1),
            step_event(EventKind::StepStart, "a", 2),
            step_event(materialization("x"), "a", 3),
            step_event(EventKind::StepSuccess, "a", 4),
            step_event(EventKind::StepSkipped, "c", 5),
        ];

        assert_eq!(reduce(&events), reduce(&events));
    }

    #[test]
    fn step_markers_open_and_close() {
        let steps = reduce(&[
            step_event(
                EventKind::EngineEvent {
                    marker_start: Some("resources".to_string()),
                    marker_end: None,
                },
                "a",
                10,
            ),
            step_event(
                EventKind::EngineEvent {
                    marker_start: None,
                    marker_end: Some("resources".to_string()),
                },
                "a",
                25,
            ),
        ]);

        assert_eq!(
            steps["a"].markers,
            vec![MarkerSpan {
                key: "resources".to_string(),
                start: Some(10),
                end: Some(25),
            }]
        );
    }

    #[test]
    fn metadata_tracks_process_and_first_exit() {
        let metadata = extract_metadata(&[
            run_event(EventKind::ProcessStart, 1),
            run_event(EventKind::ProcessStarted { process_id: 4242 }, 2),
            run_event(EventKind::RunStart, 3),
            step_event(EventKind::StepStart, "a", 4),
            run_event(EventKind::RunFailure { error: None }, 8),
            run_event(EventKind::ProcessExited { process_id: 4242 }, 9),
        ]);

        assert_eq!(metadata.starting_process_at, Some(1));
        assert_eq!(metadata.started_process_at, Some(2));
        assert_eq!(metadata.process_id, Some(4242));
        assert_eq!(metadata.started_pipeline_at, Some(3));
        assert_eq!(metadata.exited_at, Some(8));
        assert!(!metadata.init_failed);
        assert_eq!(metadata.steps["a"].state, StepStatus::Running);
    }

    #[test]
    fn init_failure_marks_exit() {
        let metadata = extract_metadata(&[
            run_event(EventKind::ProcessStart, 1),
            run_event(EventKind::RunInitFailure { error: None }, 5),
        ]);

        assert!(metadata.init_failed);
        assert_eq!(metadata.exited_at, Some(5));
        assert!(metadata.steps.is_empty());
    }

    #[test]
    fn global_markers_are_kept_apart_from_steps() {
        let metadata = extract_metadata(&[run_event(
            EventKind::EngineEvent {
                marker_start: Some("launch".to_string()),
                marker_end: None,
            },
            3,
        )]);

        assert_eq!(metadata.global_markers.len(), 1);
        assert_eq!(metadata.global_markers[0].start, Some(3));
        assert!(metadata.steps.is_empty());
    }
}
