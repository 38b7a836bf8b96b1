//! Rollback + retry con nuevos errores y agotamiento con DLQ.

use std::sync::Arc;

use serde_json::{json, Value};

use parcel_core::{FailedExecution, InMemoryKeyValueStore, IngestEngine, KeyValueStore, TableId};
use parcel_domain::{fingerprint, WorkflowEvent};
use parcel_metrics::InMemoryMetricsSink;
use parcel_repair::fakes::{InMemoryBlobStore, RecordingCallback, RecordingQueue, ScriptedAgent, ScriptedValidator};
use parcel_repair::{Collaborators, NoopCostObserver, ObjectUri, RepairConfig, RepairController, RepairOutcome};

struct Harness {
    store: Arc<InMemoryKeyValueStore>,
    blob: Arc<InMemoryBlobStore>,
    agent: Arc<ScriptedAgent>,
    validator: Arc<ScriptedValidator>,
    output_queue: Arc<RecordingQueue>,
    dlq: Arc<RecordingQueue>,
    callback: Arc<RecordingCallback>,
    metrics: Arc<InMemoryMetricsSink>,
}

impl Harness {
    fn new() -> Self {
        Self { store: Arc::new(InMemoryKeyValueStore::new()),
               blob: Arc::new(InMemoryBlobStore::new()),
               agent: Arc::new(ScriptedAgent::returning(b"patched-scripts".to_vec())),
               validator: Arc::new(ScriptedValidator::new()),
               output_queue: Arc::new(RecordingQueue::new()),
               dlq: Arc::new(RecordingQueue::new()),
               callback: Arc::new(RecordingCallback::new()),
               metrics: Arc::new(InMemoryMetricsSink::new()) }
    }

    fn controller(&self, config: RepairConfig) -> RepairController<Arc<InMemoryKeyValueStore>> {
        RepairController::new(self.store.clone(),
                              Collaborators { blob: self.blob.clone(),
                                              agent: self.agent.clone(),
                                              validator: self.validator.clone(),
                                              output_queue: self.output_queue.clone(),
                                              dlq: self.dlq.clone(),
                                              callback: self.callback.clone(),
                                              metrics: self.metrics.clone(),
                                              cost_observer: Arc::new(NoopCostObserver) },
                              config)
    }

    fn ingest(&self, event_id: &str, execution_id: &str, codes: &[String], errors_uri: &str) {
        let errors: Vec<Value> = codes.iter().map(|c| json!({"code": c, "details": {}})).collect();
        let event: WorkflowEvent = serde_json::from_value(json!({
            "eventId": event_id,
            "executionId": execution_id,
            "county": "palmbeach",
            "phase": "submit",
            "step": "validate",
            "status": "FAILED",
            "taskToken": format!("tok-{execution_id}"),
            "preparedS3Uri": "s3://data/palmbeach/output.zip",
            "errorsS3Uri": errors_uri,
            "source": {"bucket": "inbox", "key": "palmbeach/in.zip"},
            "errors": errors,
        }))
        .expect("event json");
        IngestEngine::new(self.store.clone()).ingest(&event).expect("ingest");
    }

    fn seed_blobs(&self) {
        self.blob.seed(&ObjectUri::new("parcel-scripts", "transform-scripts/palmbeach.zip"),
                       b"original-scripts".to_vec());
        self.blob.seed(&ObjectUri::new("data", "palmbeach/output.zip"), b"prepared".to_vec());
    }
}

#[tokio::test]
async fn rejection_rolls_back_and_retries_with_fresh_targets() {
    // el validador falla con "Submit errors csv: ..."; el siguiente
    // intento usa esa URI y el archive se restaura entre intentos.
    let h = Harness::new();
    let hash_first = fingerprint("bad zip", "$.address.zip", "palmbeach").to_string();
    h.ingest("r1", "E1", &[hash_first], "s3://data/palmbeach/errors.csv");
    h.seed_blobs();
    h.blob.seed(&ObjectUri::new("data", "palmbeach/errors.csv"),
                b"errorMessage,errorPath\nbad zip,$.address.zip\n".to_vec());
    h.blob.seed(&ObjectUri::new("data", "palmbeach/errors2.csv"),
                b"errorMessage,errorPath\nbad name,$.owner.name\n".to_vec());

    h.validator.push_rejection("validator failed. Submit errors csv: s3://data/palmbeach/errors2.csv", None);
    h.validator.push_success(vec![json!({"op": "put"})]);

    let controller = h.controller(RepairConfig::default());
    let outcome = controller.run_once().await.expect("run once");
    assert_eq!(outcome,
               RepairOutcome::Repaired { execution_id: "E1".to_string(), fixed_errors: 1, attempts: 2 });

    // El segundo intento bajó el archive ORIGINAL (rollback previo) y los
    // errores frescos de errors2.csv.
    let requests = h.agent.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].scripts_archive, b"original-scripts".to_vec());
    assert_eq!(requests[1].errors[0].message, "bad name");

    // El hash del CSV fresco quedó resuelto: E1 llegó a cero y desapareció.
    assert!(h.store
             .get_item(TableId::Tracking, &FailedExecution::key_for("E1"))
             .expect("get")
             .is_none());
}

#[tokio::test]
async fn exhaustion_marks_unrecoverable_and_routes_svl_to_dlq() {
    let h = Harness::new();
    let shared = fingerprint("bad zip", "$.address.zip", "palmbeach").to_string();
    h.ingest("x1", "E1", &[shared.clone(), "10999".to_string()], "s3://data/palmbeach/errors.csv");
    h.ingest("x2", "E2", &[shared.clone()], "s3://data/palmbeach/errors.csv");
    h.seed_blobs();
    h.blob.seed(&ObjectUri::new("data", "palmbeach/errors.csv"),
                b"errorMessage,errorPath\nbad zip,$.address.zip\n".to_vec());

    h.validator.push_rejection("still broken", None);
    h.validator.push_rejection("still broken", None);

    let controller = h.controller(RepairConfig { max_attempts: 2, ..RepairConfig::default() });
    let outcome = controller.run_once().await.expect("run once");
    assert_eq!(outcome, RepairOutcome::Exhausted { execution_id: "E1".to_string(), attempts: 2 });

    // SVL con fuente conocida: mensaje en la DLQ.
    let dlq = h.dlq.sent();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0]["bucket"], json!("inbox"));
    assert!(h.output_queue.sent().is_empty());

    // E1 borrada; la propagación alcanzó a E2 (comparte el código y era su
    // único error abierto, así que también desapareció).
    assert!(h.store
             .get_item(TableId::Tracking, &FailedExecution::key_for("E1"))
             .expect("get")
             .is_none());
    assert!(h.store
             .get_item(TableId::Tracking, &FailedExecution::key_for("E2"))
             .expect("get")
             .is_none());

    // Callback de falla con causa acotada.
    let failures = h.callback.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].2.len() <= 256);

    let samples = h.metrics.samples();
    assert!(samples.iter().any(|s| s.name == "AutoRepairFailure"));
}

#[tokio::test]
async fn mvl_scenario_never_routes_to_the_dlq() {
    let h = Harness::new();
    let hash = fingerprint("mirror off", "$.sale.price", "palmbeach").to_string();
    h.ingest("m1", "E1", &[hash], "s3://data/palmbeach/mvl_errors.csv");
    h.seed_blobs();
    h.blob.seed(&ObjectUri::new("data", "palmbeach/mvl_errors.csv"),
                b"errorMessage,errorPath\nmirror off,$.sale.price\n".to_vec());

    h.validator.push_rejection("mirror still off", None);
    let controller = h.controller(RepairConfig { max_attempts: 1, ..RepairConfig::default() });
    let outcome = controller.run_once().await.expect("run once");
    assert_eq!(outcome, RepairOutcome::Exhausted { execution_id: "E1".to_string(), attempts: 1 });
    assert!(h.dlq.sent().is_empty(), "MVL nunca rutea a la DLQ");
}

#[tokio::test]
async fn mvl_commit_skips_the_output_queue() {
    let h = Harness::new();
    let hash = fingerprint("mirror off", "$.sale.price", "palmbeach").to_string();
    h.ingest("mc1", "E1", &[hash], "s3://data/palmbeach/mvl_errors.csv");
    h.seed_blobs();
    h.blob.seed(&ObjectUri::new("data", "palmbeach/mvl_errors.csv"),
                b"errorMessage,errorPath\nmirror off,$.sale.price\n".to_vec());

    h.validator.push_success(vec![json!({"op": "put"})]);
    let controller = h.controller(RepairConfig::default());
    let outcome = controller.run_once().await.expect("run once");
    assert!(matches!(outcome, RepairOutcome::Repaired { .. }));
    assert!(h.output_queue.sent().is_empty(), "MVL no reenvía transaction items");
}

#[tokio::test]
async fn no_failed_executions_means_no_work() {
    let h = Harness::new();
    let controller = h.controller(RepairConfig::default());
    let outcome = controller.run_once().await.expect("run once");
    assert_eq!(outcome, RepairOutcome::NoWork);
}
