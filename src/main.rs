// Demo end-to-end del núcleo de rastreo: ingesta paralela de un lote de
// eventos sintéticos y una pasada del loop de auto-reparación contra
// colaboradores en memoria.

use std::sync::Arc;

use rayon::prelude::*;
use serde_json::json;

use parcelflow_rust::config::CONFIG;
use parcelflow_rust::{fingerprint, EventPipeline, ExecutionSelector, InMemoryKeyValueStore, InMemoryMetricsSink,
                      RepairController, RepairOutcome, SortOrder, WorkflowEvent};

use parcel_repair::fakes::{InMemoryBlobStore, RecordingCallback, RecordingQueue, ScriptedAgent,
                           ScriptedValidator};
use parcel_repair::{Collaborators, NoopCostObserver, ObjectUri};

/// Lote sintético: tres condados, ejecuciones en varias fases, y un grupo
/// de ejecuciones de palmbeach que comparten el mismo fingerprint (objetivo
/// del loop de reparación).
fn synthetic_events() -> Vec<WorkflowEvent> {
    let shared_hash = fingerprint("bad zip", "$.address.zip", "palmbeach").to_string();
    let mut raw = vec![];
    for (i, county) in ["palmbeach", "broward", "duval"].iter().enumerate() {
        raw.push(json!({
            "eventId": format!("demo-prep-{i}"),
            "executionId": format!("X{i}"),
            "county": county, "dataGroupLabel": "dg1",
            "phase": "prepare", "step": "download", "status": "SUCCEEDED"
        }));
    }
    for i in 0..3 {
        raw.push(json!({
            "eventId": format!("demo-fail-{i}"),
            "executionId": format!("F{i}"),
            "county": "palmbeach", "dataGroupLabel": "dg1",
            "phase": "submit", "step": "validate", "status": "FAILED",
            "preparedS3Uri": "s3://demo-data/palmbeach/output.zip",
            "errorsS3Uri": "s3://demo-data/palmbeach/errors.csv",
            "source": {"bucket": "demo-inbox", "key": "palmbeach/in.zip"},
            "errors": [{"code": shared_hash, "details": {"message": "bad zip"}}]
        }));
    }
    serde_json::from_value(serde_json::Value::Array(raw)).expect("synthetic events")
}

#[tokio::main]
async fn main() {
    let store = Arc::new(InMemoryKeyValueStore::new());
    let sink = Arc::new(InMemoryMetricsSink::new());
    let pipeline = EventPipeline::new(store.clone(), sink.clone());

    // Ingesta paralela entre eventos (el sistema es paralelo entre eventos,
    // secuencial dentro de cada uno).
    let events = synthetic_events();
    let failures: Vec<String> = events.par_iter()
                                      .filter_map(|ev| pipeline.handle(ev).err().map(|e| e.to_string()))
                                      .collect();
    assert!(failures.is_empty(), "ingesta demo sin errores: {failures:?}");
    println!("{} eventos ingeridos, {} métricas publicadas", events.len(), sink.samples().len());

    let selector = ExecutionSelector::new(store.clone());
    if let Some(worst) = selector.execution_with(SortOrder::Most, None).expect("selector") {
        println!("peor ejecución: {} con {} errores abiertos",
                 worst.execution.execution_id,
                 worst.execution.open_error_count);
    }

    // Colaboradores en memoria para la pasada de reparación.
    let blob = Arc::new(InMemoryBlobStore::new());
    blob.seed(&ObjectUri::new(CONFIG.repair.scripts_bucket.clone(),
                              format!("{}/palmbeach.zip", CONFIG.repair.transform_prefix)),
              b"original-scripts".to_vec());
    blob.seed(&ObjectUri::new("demo-data", "palmbeach/output.zip"), b"prepared".to_vec());
    blob.seed(&ObjectUri::new("demo-data", "palmbeach/errors.csv"),
              b"errorMessage,errorPath\nbad zip,$.address.zip\n".to_vec());
    let validator = Arc::new(ScriptedValidator::new());
    validator.push_success(vec![json!({"op": "put", "item": "demo"})]);

    let controller = RepairController::new(store.clone(),
                                           Collaborators { blob,
                                                           agent: Arc::new(ScriptedAgent::returning(
                                                               b"patched-scripts".to_vec())),
                                                           validator,
                                                           output_queue: Arc::new(RecordingQueue::new()),
                                                           dlq: Arc::new(RecordingQueue::new()),
                                                           callback: Arc::new(RecordingCallback::new()),
                                                           metrics: sink.clone(),
                                                           cost_observer: Arc::new(NoopCostObserver) },
                                           CONFIG.repair.clone());

    match controller.run_once().await.expect("repair run") {
        RepairOutcome::Repaired { execution_id, fixed_errors, attempts } => {
            println!("reparada {execution_id}: {fixed_errors} errores en {attempts} intento(s)");
        }
        other => println!("resultado de reparación: {other:?}"),
    }

    // La cascada marcó el fingerprint compartido en las otras ejecuciones:
    // no debe quedar ninguna fallida de palmbeach con ese único error.
    let remaining = selector.execution_with(SortOrder::Most, None).expect("selector");
    println!("ejecuciones fallidas restantes: {}",
             remaining.map(|s| s.execution.execution_id).unwrap_or_else(|| "ninguna".to_string()));
}
