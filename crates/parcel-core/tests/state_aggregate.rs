//! Transiciones de estado y balance de agregados.

use std::sync::Arc;

use serde_json::json;

use parcel_core::{ExecutionState, InMemoryKeyValueStore, KeyValueStore, StateEngine, StateOutcome, StepAggregate,
                  TableId};
use parcel_domain::{Bucket, WorkflowEvent};

fn event(event_id: &str, execution_id: &str, phase: &str, step: &str, status: &str) -> WorkflowEvent {
    serde_json::from_value(json!({
        "eventId": event_id,
        "executionId": execution_id,
        "county": "palmbeach",
        "dataGroupLabel": "dg1",
        "phase": phase,
        "step": step,
        "status": status,
    }))
    .expect("event json")
}

fn aggregate(store: &Arc<InMemoryKeyValueStore>, phase: &str, step: &str) -> StepAggregate {
    let item = store.get_item(TableId::Tracking, &StepAggregate::key_for("palmbeach", "dg1", phase, step))
                    .expect("get")
                    .expect("aggregate cell present");
    StepAggregate::from_item(&item).expect("decode")
}

fn state(store: &Arc<InMemoryKeyValueStore>, execution_id: &str) -> ExecutionState {
    let item = store.get_item(TableId::State, &ExecutionState::key_for(execution_id))
                    .expect("get")
                    .expect("state present");
    ExecutionState::from_item(&item).expect("decode")
}

#[test]
fn bucket_transition_moves_the_counters() {
    // (prepare, download, IN_PROGRESS) → (prepare, download, SUCCEEDED)
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = StateEngine::new(store.clone());

    let first = engine.apply(&event("t1", "E3", "prepare", "download", "IN_PROGRESS")).expect("apply");
    assert_eq!(first, StateOutcome::Created);
    assert_eq!(aggregate(&store, "prepare", "download").in_progress_count, 1);
    assert_eq!(state(&store, "E3").version, 1);

    let second = engine.apply(&event("t2", "E3", "prepare", "download", "SUCCEEDED")).expect("apply");
    assert_eq!(second,
               StateOutcome::Transitioned { from: Bucket::InProgress, to: Bucket::Succeeded });
    let cell = aggregate(&store, "prepare", "download");
    assert_eq!(cell.in_progress_count, 0);
    assert_eq!(cell.succeeded_count, 1);
    let st = state(&store, "E3");
    assert_eq!(st.version, 2);
    assert_eq!(st.bucket, Bucket::Succeeded);
}

#[test]
fn unchanged_cell_is_a_no_op() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = StateEngine::new(store.clone());
    engine.apply(&event("u1", "E4", "prepare", "download", "SCHEDULED")).expect("apply");
    // RUNNING normaliza al mismo bucket IN_PROGRESS: misma celda, no-op.
    let outcome = engine.apply(&event("u2", "E4", "prepare", "download", "RUNNING")).expect("apply");
    assert_eq!(outcome, StateOutcome::Unchanged);
    assert_eq!(aggregate(&store, "prepare", "download").in_progress_count, 1);
    assert_eq!(state(&store, "E4").version, 1);
}

#[test]
fn phase_change_moves_between_cells() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = StateEngine::new(store.clone());
    engine.apply(&event("p1", "E5", "prepare", "download", "RUNNING")).expect("apply");
    engine.apply(&event("p2", "E5", "transform", "run", "RUNNING")).expect("apply");

    assert_eq!(aggregate(&store, "prepare", "download").in_progress_count, 0);
    assert_eq!(aggregate(&store, "transform", "run").in_progress_count, 1);
    let st = state(&store, "E5");
    assert_eq!(st.phase, "transform");
    assert_eq!(st.version, 2);
}

#[test]
fn parked_counts_as_in_progress() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = StateEngine::new(store.clone());
    engine.apply(&event("k1", "E6", "submit", "upload", "PARKED")).expect("apply");
    let st = state(&store, "E6");
    assert_eq!(st.bucket, Bucket::InProgress);
    assert_eq!(st.raw_status.as_str(), "PARKED");
    assert_eq!(aggregate(&store, "submit", "upload").in_progress_count, 1);
}

#[test]
fn redelivered_event_reaches_the_same_state() {
    // La redelivery del mismo evento es no-op.
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = StateEngine::new(store.clone());
    let ev = event("r1", "E7", "prepare", "download", "FAILED");
    engine.apply(&ev).expect("first delivery");
    let before = store.dump(TableId::Tracking);
    let outcome = engine.apply(&ev).expect("redelivery");
    assert_eq!(outcome, StateOutcome::Unchanged);
    assert_eq!(before, store.dump(TableId::Tracking));
}
