//! Invariantes contables sobre secuencias generadas de eventos.
//!
//! Generador determinista (LCG) en lugar de aleatoriedad real: cada corrida
//! ve exactamente la misma secuencia y las fallas son reproducibles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};

use parcel_core::{audit, ErrorRecord, ExecutionErrorLink, FailedExecution, InMemoryKeyValueStore, IngestEngine,
                  Item, KeyValueStore, StateEngine, StatusMutator, TableId};
use parcel_domain::WorkflowEvent;

struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn pick<'a, T>(&mut self, options: &'a [T]) -> &'a T {
        &options[(self.next() as usize) % options.len()]
    }
}

fn ingest_event(event_id: &str, execution_id: &str, codes: &[&str]) -> WorkflowEvent {
    let errors: Vec<Value> = codes.iter().map(|c| json!({"code": c, "details": {"seen": c}})).collect();
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

/// Quita los atributos de reloj para comparar estados replay-vs-replay.
fn normalized(items: Vec<Item>) -> Vec<Item> {
    items.into_iter()
         .map(|mut item| {
             item.remove("createdAt");
             item.remove("updatedAt");
             item.remove("lastEventTime");
             item
         })
         .collect()
}

#[test]
fn counters_balance_after_any_event_sequence() {
    let executions = ["G1", "G2", "G3", "G4"];
    let codes = ["01111", "01222", "23456", "34567", "45678"];
    let mut rng = Lcg::new(0x5eed);

    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());

    // Lo esperado, contado a mano mientras se genera.
    let mut expected_per_link: HashMap<(String, String), u64> = HashMap::new();
    let mut expected_per_code: HashMap<String, u64> = HashMap::new();

    for i in 0..40 {
        let execution_id = *rng.pick(&executions);
        let batch_size = 1 + (rng.next() as usize) % 4;
        let batch: Vec<&str> = (0..batch_size).map(|_| *rng.pick(&codes)).collect();
        for code in &batch {
            *expected_per_link.entry((execution_id.to_string(), code.to_string())).or_default() += 1;
            *expected_per_code.entry(code.to_string()).or_default() += 1;
        }
        engine.ingest(&ingest_event(&format!("gen-{i}"), execution_id, &batch)).expect("ingest");
    }

    // totalCount del registro == Σ occurrences de sus links.
    for (code, expected_total) in &expected_per_code {
        let record = ErrorRecord::from_item(&store.get_item(TableId::Tracking, &ErrorRecord::key_for(code))
                                                  .expect("get")
                                                  .expect("record present")).expect("decode");
        assert_eq!(record.total_count, *expected_total, "totalCount de {code}");
        let link_sum: u64 = expected_per_link.iter()
                                             .filter(|((_, c), _)| c == code)
                                             .map(|((e, c), _)| {
                                                 let item = store.get_item(TableId::Tracking,
                                                                           &ExecutionErrorLink::key_for(e, c))
                                                                 .expect("get")
                                                                 .expect("link present");
                                                 ExecutionErrorLink::from_item(&item).expect("decode").occurrences
                                             })
                                             .sum();
        assert_eq!(record.total_count, link_sum, "suma de links de {code}");
    }

    // Conteos unique/total/open por ejecución.
    for execution_id in &executions {
        let distinct: HashSet<&str> = expected_per_link.keys()
                                                       .filter(|(e, _)| e == execution_id)
                                                       .map(|(_, c)| c.as_str())
                                                       .collect();
        let total: u64 = expected_per_link.iter().filter(|((e, _), _)| e == execution_id).map(|(_, n)| n).sum();
        if distinct.is_empty() {
            continue;
        }
        let exec = FailedExecution::from_item(&store.get_item(TableId::Tracking,
                                                              &FailedExecution::key_for(execution_id))
                                                    .expect("get")
                                                    .expect("present")).expect("decode");
        assert_eq!(exec.unique_error_count, distinct.len() as u64, "unique de {execution_id}");
        assert_eq!(exec.total_occurrences, total, "total de {execution_id}");
        // Todos los links nacen en failed: open == unique.
        assert_eq!(exec.open_error_count, distinct.len() as u64, "open de {execution_id}");
    }

    // El auditor no debe encontrar ninguna violación sobre este estado.
    let report = audit(&store).expect("audit");
    assert!(report.is_clean(), "violaciones: {:?}", report.violations);
}

#[test]
fn the_auditor_stays_clean_through_mutation_cascades() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = IngestEngine::new(store.clone());
    let mutator = StatusMutator::new(store.clone());
    let mut rng = Lcg::new(0xcafe);
    let codes = ["01111", "01222", "23456"];

    for i in 0..15 {
        let execution_id = format!("M{}", (rng.next() as usize) % 5);
        let batch: Vec<&str> = (0..1 + (rng.next() as usize) % 3).map(|_| *rng.pick(&codes)).collect();
        engine.ingest(&ingest_event(&format!("mut-{i}"), &execution_id, &batch)).expect("ingest");
    }

    // Cascada parcial y luego total; el estado debe auditar limpio después
    // de cada una (flips condicionados, decrementos y borrados en cero).
    mutator.mark_solved_for_hashes(&["01111".to_string()], "palmbeach").expect("partial");
    let mid = audit(&store).expect("audit");
    assert!(mid.is_clean(), "violaciones tras cascada parcial: {:?}", mid.violations);

    mutator.mark_unrecoverable_for_code("01222").expect("more");
    mutator.mark_unrecoverable_for_code("23456").expect("rest");
    let done = audit(&store).expect("audit");
    assert!(done.is_clean(), "violaciones tras cascada total: {:?}", done.violations);
    assert_eq!(done.executions, 0, "sin errores abiertos no quedan ejecuciones");
}

#[test]
fn replaying_every_event_twice_leaves_identical_state() {
    // Doble entrega de cada evento == entrega única.
    let executions = ["R1", "R2"];
    let codes = ["01111", "23456", "34567"];

    let single = Arc::new(InMemoryKeyValueStore::new());
    let doubled = Arc::new(InMemoryKeyValueStore::new());
    let single_engine = IngestEngine::new(single.clone());
    let doubled_engine = IngestEngine::new(doubled.clone());

    let mut rng = Lcg::new(0xfeed);
    for i in 0..20 {
        let execution_id = *rng.pick(&executions);
        let batch_size = 1 + (rng.next() as usize) % 3;
        let batch: Vec<&str> = (0..batch_size).map(|_| *rng.pick(&codes)).collect();
        let ev = ingest_event(&format!("rep-{i}"), execution_id, &batch);
        single_engine.ingest(&ev).expect("single");
        doubled_engine.ingest(&ev).expect("doubled first");
        doubled_engine.ingest(&ev).expect("doubled replay");
    }

    assert_eq!(normalized(single.dump(TableId::Tracking)), normalized(doubled.dump(TableId::Tracking)));
}

#[test]
fn aggregates_match_execution_states_for_every_cell() {
    // Σ contadores de StepAggregate por (county, dg, bucket) ==
    // ejecuciones cuyo estado vive en ese bucket.
    let executions = ["S1", "S2", "S3", "S4", "S5", "S6"];
    let counties = ["alpha", "beta"];
    let phases = ["prepare", "transform"];
    let steps = ["download", "run"];
    let statuses = ["SCHEDULED", "IN_PROGRESS", "RUNNING", "SUCCEEDED", "COMPLETED", "FAILED", "PARKED"];

    let store = Arc::new(InMemoryKeyValueStore::new());
    let engine = StateEngine::new(store.clone());
    let mut rng = Lcg::new(0xabcd);

    for i in 0..60 {
        let ev: WorkflowEvent = serde_json::from_value(json!({
                                    "eventId": format!("st-{i}"),
                                    "executionId": *rng.pick(&executions),
                                    "county": *rng.pick(&counties),
                                    "dataGroupLabel": "dg1",
                                    "phase": *rng.pick(&phases),
                                    "step": *rng.pick(&steps),
                                    "status": *rng.pick(&statuses),
                                })).expect("event json");
        engine.apply(&ev).expect("apply");
    }

    // Conteo real desde los estados.
    let mut from_states: HashMap<(String, String, String), i64> = HashMap::new();
    for item in store.dump(TableId::State) {
        let county = item.get("county").and_then(Value::as_str).expect("county").to_string();
        let dg = item.get("dataGroupLabel").and_then(Value::as_str).unwrap_or("").to_string();
        let bucket = item.get("bucket").and_then(Value::as_str).expect("bucket").to_string();
        *from_states.entry((county, dg, bucket)).or_default() += 1;
    }

    // Suma de celdas de agregados.
    let mut from_aggregates: HashMap<(String, String, String), i64> = HashMap::new();
    for item in store.dump(TableId::Tracking) {
        if item.get("entityType").and_then(Value::as_str) != Some("StepAggregate") {
            continue;
        }
        let county = item.get("county").and_then(Value::as_str).expect("county").to_string();
        let dg = item.get("dataGroupLabel").and_then(Value::as_str).unwrap_or("").to_string();
        for (attr, bucket) in [("inProgressCount", "IN_PROGRESS"), ("failedCount", "FAILED"),
                               ("succeededCount", "SUCCEEDED")] {
            let count = item.get(attr).and_then(Value::as_i64).unwrap_or(0);
            if count != 0 {
                *from_aggregates.entry((county.clone(), dg.clone(), bucket.to_string())).or_default() += count;
            }
        }
    }

    assert_eq!(from_states, from_aggregates, "balance de agregados");
}
