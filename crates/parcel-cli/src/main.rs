//! parcel-cli: alimenta eventos al pipeline y consulta los selectores.
//!
//! Uso:
//! - `parcel-cli` — corre el lote de eventos demo embebido.
//! - `parcel-cli eventos.json` — lee un array JSON de eventos de workflow.
//!
//! Todo corre contra el store en memoria; es una herramienta de inspección
//! del comportamiento del core, no un servicio.

use std::sync::Arc;

use parcel_core::{audit, EventPipeline, ExecutionSelector, InMemoryKeyValueStore, SortOrder, TableId};
use parcel_domain::WorkflowEvent;
use parcel_metrics::InMemoryMetricsSink;

fn demo_events() -> Vec<WorkflowEvent> {
    let raw = serde_json::json!([
        {"eventId": "d1", "executionId": "E1", "county": "palmbeach", "dataGroupLabel": "dg1",
         "phase": "prepare", "step": "download", "status": "RUNNING"},
        {"eventId": "d2", "executionId": "E1", "county": "palmbeach", "dataGroupLabel": "dg1",
         "phase": "transform", "step": "run", "status": "FAILED",
         "errors": [{"code": "20002", "details": {"message": "TypeError: x is undefined"}},
                    {"code": "20002", "details": {}},
                    {"code": "20101", "details": {"message": "schema validation failed"}}]},
        {"eventId": "d3", "executionId": "E2", "county": "palmbeach", "dataGroupLabel": "dg1",
         "phase": "transform", "step": "run", "status": "FAILED",
         "errors": [{"code": "20002", "details": {}}]},
        {"eventId": "d4", "executionId": "E3", "county": "broward", "dataGroupLabel": "dg1",
         "phase": "prepare", "step": "download", "status": "SUCCEEDED"}
    ]);
    serde_json::from_value(raw).expect("demo events")
}

fn main() {
    let _ = dotenvy::dotenv();

    let events: Vec<WorkflowEvent> = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).expect("read events file");
            serde_json::from_str(&raw).expect("parse events file")
        }
        None => demo_events(),
    };

    let store = Arc::new(InMemoryKeyValueStore::new());
    let sink = Arc::new(InMemoryMetricsSink::new());
    let pipeline = EventPipeline::new(store.clone(), sink.clone());

    for event in &events {
        match pipeline.handle(event) {
            Ok(report) => println!("evento {} -> ingest={:?} state={:?}",
                                   event.event_token(),
                                   report.ingest,
                                   report.state),
            Err(e) => eprintln!("evento {} -> ERROR {e}", event.event_token()),
        }
    }

    // Resumen: peor y mejor ejecución por errores abiertos.
    let selector = ExecutionSelector::new(store.clone());
    for (label, order) in [("most", SortOrder::Most), ("least", SortOrder::Least)] {
        match selector.execution_with(order, None).expect("selector") {
            Some(selected) => println!("{label}: {} (open={}, errores={})",
                                       selected.execution.execution_id,
                                       selected.execution.open_error_count,
                                       selected.errors.len()),
            None => println!("{label}: sin ejecuciones fallidas"),
        }
    }

    // Celdas de agregación vigentes.
    for item in store.dump(TableId::Tracking) {
        if item.get("entityType").and_then(serde_json::Value::as_str) != Some("StepAggregate") {
            continue;
        }
        let text = |attr: &str| item.get(attr).and_then(serde_json::Value::as_str).unwrap_or("?").to_string();
        let count = |attr: &str| item.get(attr).and_then(serde_json::Value::as_i64).unwrap_or(0);
        println!("agg {}/{} {}/{} -> in_progress={} failed={} succeeded={}",
                 text("county"),
                 text("dataGroupLabel"),
                 text("phase"),
                 text("step"),
                 count("inProgressCount"),
                 count("failedCount"),
                 count("succeededCount"));
    }

    println!("{} muestras de métrica publicadas", sink.samples().len());

    // Auditoría de invariantes sobre el estado resultante.
    match audit(&store) {
        Ok(report) if report.is_clean() => {
            println!("auditoría limpia: {} ejecuciones, {} registros, {} links, {} celdas",
                     report.executions,
                     report.records,
                     report.links,
                     report.aggregate_cells);
        }
        Ok(report) => {
            eprintln!("auditoría con violaciones:");
            for violation in &report.violations {
                eprintln!("  - {violation}");
            }
        }
        Err(e) => eprintln!("auditoría falló: {e}"),
    }
}
