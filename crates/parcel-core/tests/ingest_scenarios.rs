//! Escenarios end-to-end de ingesta.
//!
//! Verifica:
//! - Conteos de la ejecución fallida (unique/total/open) por lote.
//! - Sort keys GSI derivadas del contador post-incremento.
//! - Arista inversa error → ejecuciones.

use std::sync::Arc;

use serde_json::{json, Value};

use parcel_core::{ErrorRecord, ExecutionErrorLink, FailedExecution, InMemoryKeyValueStore, IndexId, IngestEngine,
                  IngestOutcome, KeyValueStore, QueryRequest, TableId};
use parcel_domain::{ErrorStatus, WorkflowEvent};

fn event(execution_id: &str, county: &str, errors: &[(&str, Value)]) -> WorkflowEvent {
    let errors: Vec<Value> = errors.iter().map(|(c, d)| json!({"code": c, "details": d})).collect();
    serde_json::from_value(json!({
        "eventId": format!("ev-{execution_id}-{}", errors.len()),
        "executionId": execution_id,
        "county": county,
        "phase": "transform",
        "step": "run",
        "status": "FAILED",
        "errors": errors,
    }))
    .expect("event json")
}

#[test]
fn single_error_ingestion() {
    // un solo error nuevo
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());
    let outcome = engine.ingest(&event("E1", "palmbeach", &[("01256", json!({"r": "t"}))]))
                        .expect("ingest ok");
    assert_eq!(outcome,
               IngestOutcome::Ingested { unique_codes: 1, new_codes: 1, total_occurrences: 1 });

    let exec_item = store.get_item(TableId::Tracking, &FailedExecution::key_for("E1"))
                         .expect("get")
                         .expect("execution row present");
    let exec = FailedExecution::from_item(&exec_item).expect("decode");
    assert_eq!(exec.unique_error_count, 1);
    assert_eq!(exec.total_occurrences, 1);
    assert_eq!(exec.open_error_count, 1);
    assert_eq!(exec.error_type, "01");
    assert_eq!(exec.status, ErrorStatus::Failed);
    assert_eq!(exec_item.get("gsi1sk").and_then(Value::as_str),
               Some("COUNT#0000000001#EXECUTION#E1"));

    let record_item = store.get_item(TableId::Tracking, &ErrorRecord::key_for("01256"))
                           .expect("get")
                           .expect("error record present");
    let record = ErrorRecord::from_item(&record_item).expect("decode");
    assert_eq!(record.total_count, 1);
    assert_eq!(record.error_details, json!({"r": "t"}));
    assert_eq!(record_item.get("gsi2sk").and_then(Value::as_str),
               Some("COUNT#FAILED#0000000001#ERROR#01256"));

    let link_item = store.get_item(TableId::Tracking, &ExecutionErrorLink::key_for("E1", "01256"))
                         .expect("get")
                         .expect("link present");
    let link = ExecutionErrorLink::from_item(&link_item).expect("decode");
    assert_eq!(link.occurrences, 1);
    assert_eq!(link.status, ErrorStatus::Failed);
}

#[test]
fn repeated_codes_accumulate_per_link() {
    // [01256×3, 23456×2]
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());
    let errors = [("01256", json!({"n": 1})),
                  ("01256", json!({"n": 2})),
                  ("23456", json!({"m": 1})),
                  ("01256", json!({"n": 3})),
                  ("23456", json!({"m": 2}))];
    engine.ingest(&event("E1", "palmbeach", &errors)).expect("ingest ok");

    let exec = FailedExecution::from_item(&store.get_item(TableId::Tracking, &FailedExecution::key_for("E1"))
                                                .expect("get")
                                                .expect("present")).expect("decode");
    assert_eq!(exec.unique_error_count, 2);
    assert_eq!(exec.total_occurrences, 5);
    assert_eq!(exec.open_error_count, 2);
    // Tipos mezclados (01 y 23) → errorType vacío
    assert_eq!(exec.error_type, "");

    let link_a = ExecutionErrorLink::from_item(&store.get_item(TableId::Tracking,
                                                               &ExecutionErrorLink::key_for("E1", "01256"))
                                                     .expect("get")
                                                     .expect("present")).expect("decode");
    assert_eq!(link_a.occurrences, 3);
    // Se conserva el PRIMER details observado
    assert_eq!(link_a.error_details, json!({"n": 1}));
    let link_b = ExecutionErrorLink::from_item(&store.get_item(TableId::Tracking,
                                                               &ExecutionErrorLink::key_for("E1", "23456"))
                                                     .expect("get")
                                                     .expect("present")).expect("decode");
    assert_eq!(link_b.occurrences, 2);

    let record_a = ErrorRecord::from_item(&store.get_item(TableId::Tracking, &ErrorRecord::key_for("01256"))
                                                .expect("get")
                                                .expect("present")).expect("decode");
    assert_eq!(record_a.total_count, 3);
    let record_b = ErrorRecord::from_item(&store.get_item(TableId::Tracking, &ErrorRecord::key_for("23456"))
                                                .expect("get")
                                                .expect("present")).expect("decode");
    assert_eq!(record_b.total_count, 2);
}

#[test]
fn shared_error_across_two_executions() {
    // E1 y E2 comparten 01256
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());
    engine.ingest(&event("E1", "palmbeach", &[("01256", json!({})), ("23456", json!({}))]))
          .expect("ingest E1");
    engine.ingest(&event("E2", "palmbeach", &[("01256", json!({})), ("34567", json!({}))]))
          .expect("ingest E2");

    let record = ErrorRecord::from_item(&store.get_item(TableId::Tracking, &ErrorRecord::key_for("01256"))
                                              .expect("get")
                                              .expect("present")).expect("decode");
    assert_eq!(record.total_count, 2);

    // Arista inversa: dos links bajo ERROR#01256
    let mut request = QueryRequest::new(TableId::Tracking, IndexId::Gsi1, "ERROR#01256");
    request.entity_type = Some("ExecutionErrorLink".to_string());
    let page = store.query(&request).expect("query");
    assert_eq!(page.items.len(), 2);

    for execution_id in ["E1", "E2"] {
        let exec = FailedExecution::from_item(&store.get_item(TableId::Tracking,
                                                              &FailedExecution::key_for(execution_id))
                                                    .expect("get")
                                                    .expect("present")).expect("decode");
        assert_eq!(exec.open_error_count, 2, "openErrorCount de {execution_id}");
    }
}

#[test]
fn error_type_tracks_the_accumulated_code_set_across_events() {
    // El tipo dominante se calcula sobre TODOS los códigos de la ejecución,
    // no sobre el último lote: un segundo evento de otro tipo lo vacía
    // aunque ese lote sea de un solo tipo.
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());
    let event_with_id = |event_id: &str, errors: &[&str]| -> WorkflowEvent {
        let errors: Vec<Value> = errors.iter().map(|c| json!({"code": c, "details": {}})).collect();
        serde_json::from_value(json!({
            "eventId": event_id,
            "executionId": "E1",
            "county": "palmbeach",
            "phase": "transform",
            "step": "run",
            "status": "FAILED",
            "errors": errors,
        }))
        .expect("event json")
    };
    let load = |store: &Arc<InMemoryKeyValueStore>| -> (FailedExecution, String) {
        let item = store.get_item(TableId::Tracking, &FailedExecution::key_for("E1"))
                        .expect("get")
                        .expect("present");
        let gsi3sk = item.get("gsi3sk").and_then(Value::as_str).expect("gsi3sk").to_string();
        (FailedExecution::from_item(&item).expect("decode"), gsi3sk)
    };

    engine.ingest(&event_with_id("acc-1", &["01111", "01222"])).expect("first");
    let (exec, gsi3sk) = load(&store);
    assert_eq!(exec.error_type, "01");
    assert!(gsi3sk.starts_with("COUNT#01#FAILED#"), "gsi3sk con tipo: {gsi3sk}");

    // Lote de un solo código tipo 02: el acumulado queda mixto 01/02.
    engine.ingest(&event_with_id("acc-2", &["02999"])).expect("second");
    let (exec, gsi3sk) = load(&store);
    assert_eq!(exec.unique_error_count, 3);
    assert_eq!(exec.error_type, "", "mezcla acumulada 01/02 vacía el tipo");
    assert!(gsi3sk.starts_with("COUNT##FAILED#"), "gsi3sk sin tipo: {gsi3sk}");

    // Otro lote tipo 01 tampoco puede "restaurar" el tipo: el 02999 previo
    // sigue enlazado.
    engine.ingest(&event_with_id("acc-3", &["01333"])).expect("third");
    let (exec, _) = load(&store);
    assert_eq!(exec.unique_error_count, 4);
    assert_eq!(exec.error_type, "");
}

#[test]
fn empty_error_list_writes_nothing() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());
    let outcome = engine.ingest(&event("E9", "palmbeach", &[])).expect("ingest ok");
    assert_eq!(outcome, IngestOutcome::NoErrors);
    assert!(store.is_empty(TableId::Tracking));
}
