//! Cascadas del mutador de estatus e idempotencia de re-ejecución.

use std::sync::Arc;

use serde_json::{json, Value};

use parcel_core::{ErrorRecord, ExecutionErrorLink, FailedExecution, InMemoryKeyValueStore, IngestEngine,
                  KeyValueStore, StatusMutator, TableId};
use parcel_domain::{ErrorStatus, WorkflowEvent};

fn event(event_id: &str, execution_id: &str, errors: &[&str]) -> WorkflowEvent {
    let errors: Vec<Value> = errors.iter().map(|c| json!({"code": c, "details": {}})).collect();
    serde_json::from_value(json!({
        "eventId": event_id,
        "executionId": execution_id,
        "county": "palmbeach",
        "phase": "transform",
        "step": "run",
        "status": "FAILED",
        "errors": errors,
    }))
    .expect("event json")
}

fn seed_shared_error(store: &Arc<InMemoryKeyValueStore>) {
    let engine = IngestEngine::new(store.clone());
    engine.ingest(&event("ev1", "E1", &["01256", "23456"])).expect("ingest E1");
    engine.ingest(&event("ev2", "E2", &["01256", "34567"])).expect("ingest E2");
}

fn link_status(store: &Arc<InMemoryKeyValueStore>, execution_id: &str, code: &str) -> ErrorStatus {
    let item = store.get_item(TableId::Tracking, &ExecutionErrorLink::key_for(execution_id, code))
                    .expect("get")
                    .expect("link present");
    ExecutionErrorLink::from_item(&item).expect("decode").status
}

#[test]
fn mark_solved_cascades_across_executions() {
    // el mismo hash en E1 y E2 se marca en ambas
    let store = Arc::new(InMemoryKeyValueStore::new());
    seed_shared_error(&store);
    let mutator = StatusMutator::new(store.clone());

    let report = mutator.mark_solved_for_hashes(&["01256".to_string()], "palmbeach")
                        .expect("mark solved");
    assert_eq!(report.links_flipped, 2);
    assert!(report.executions_deleted.is_empty());
    assert_eq!(report.records_updated, 1);

    assert_eq!(link_status(&store, "E1", "01256"), ErrorStatus::MaybeSolved);
    assert_eq!(link_status(&store, "E2", "01256"), ErrorStatus::MaybeSolved);
    // Los otros códigos siguen abiertos
    assert_eq!(link_status(&store, "E1", "23456"), ErrorStatus::Failed);

    for execution_id in ["E1", "E2"] {
        let exec = FailedExecution::from_item(&store.get_item(TableId::Tracking,
                                                              &FailedExecution::key_for(execution_id))
                                                    .expect("get")
                                                    .expect("present")).expect("decode");
        assert_eq!(exec.open_error_count, 1, "openErrorCount decrementado en {execution_id}");
    }

    let record_item = store.get_item(TableId::Tracking, &ErrorRecord::key_for("01256"))
                           .expect("get")
                           .expect("present");
    let record = ErrorRecord::from_item(&record_item).expect("decode");
    assert_eq!(record.status, ErrorStatus::MaybeSolved);
    let gsi2sk = record_item.get("gsi2sk").and_then(Value::as_str).expect("gsi2sk");
    assert!(gsi2sk.starts_with("COUNT#MAYBESOLVED#"), "gsi2sk reescrita: {gsi2sk}");
}

#[test]
fn last_open_error_deletes_the_execution() {
    // Cuando el mutador voltea el último error abierto, la fila
    // FailedExecution desaparece con todos sus links.
    let store = Arc::new(InMemoryKeyValueStore::new());
    seed_shared_error(&store);
    let mutator = StatusMutator::new(store.clone());

    mutator.mark_solved_for_hashes(&["01256".to_string()], "palmbeach").expect("first");
    let report = mutator.mark_solved_for_hashes(&["23456".to_string(), "34567".to_string()], "palmbeach")
                        .expect("second");
    assert_eq!(report.links_flipped, 2);
    let mut deleted = report.executions_deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["E1".to_string(), "E2".to_string()]);

    for execution_id in ["E1", "E2"] {
        assert!(store.get_item(TableId::Tracking, &FailedExecution::key_for(execution_id))
                     .expect("get")
                     .is_none(),
                "{execution_id} debe estar borrada");
        assert!(store.get_item(TableId::Tracking, &ExecutionErrorLink::key_for(execution_id, "01256"))
                     .expect("get")
                     .is_none(),
                "links de {execution_id} deben borrarse con la fila");
    }
    // Los registros de error viven para siempre (solo cambia el estatus)
    assert!(store.get_item(TableId::Tracking, &ErrorRecord::key_for("23456"))
                 .expect("get")
                 .is_some());
}

#[test]
fn rerunning_the_same_mutation_is_a_no_op() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    seed_shared_error(&store);
    let mutator = StatusMutator::new(store.clone());

    mutator.mark_solved_for_hashes(&["01256".to_string()], "palmbeach").expect("first run");
    let before = store.dump(TableId::Tracking);
    let report = mutator.mark_solved_for_hashes(&["01256".to_string()], "palmbeach").expect("second run");

    // Nada que voltear (ya están maybeSolved); los contadores no se tocan.
    assert_eq!(report.links_flipped, 0);
    let after = store.dump(TableId::Tracking);
    let strip = |items: Vec<parcel_core::Item>| -> Vec<parcel_core::Item> {
        items.into_iter()
             .map(|mut i| {
                 i.remove("updatedAt");
                 i
             })
             .collect()
    };
    assert_eq!(strip(before), strip(after));
}

#[test]
fn unrecoverable_propagates_from_an_execution() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    seed_shared_error(&store);
    let mutator = StatusMutator::new(store.clone());

    // E1 agotó reintentos: sus códigos (01256, 23456) se vuelven
    // maybeUnrecoverable también en E2, que comparte 01256.
    let report = mutator.mark_unrecoverable_for_execution("E1").expect("mark unrecoverable");
    assert_eq!(report.executions_deleted, vec!["E1".to_string()]);

    // E2 conserva su otro código abierto
    let exec2 = FailedExecution::from_item(&store.get_item(TableId::Tracking, &FailedExecution::key_for("E2"))
                                                 .expect("get")
                                                 .expect("present")).expect("decode");
    assert_eq!(exec2.open_error_count, 1);
    assert_eq!(link_status(&store, "E2", "01256"), ErrorStatus::MaybeUnrecoverable);
    assert_eq!(link_status(&store, "E2", "34567"), ErrorStatus::Failed);

    let record = ErrorRecord::from_item(&store.get_item(TableId::Tracking, &ErrorRecord::key_for("23456"))
                                              .expect("get")
                                              .expect("present")).expect("decode");
    assert_eq!(record.status, ErrorStatus::MaybeUnrecoverable);
}
