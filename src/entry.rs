//! Punto de entrada por lotes (cola de mensajes / bus de eventos).
//!
//! Acepta dos formatos:
//! - Un sobre de cola `{"Records": [{"messageId": ..., "body": "<json>"}]}`,
//!   donde cada `body` es un evento de workflow serializado.
//! - Un array JSON plano de eventos (invocación directa).
//!
//! Semántica de fallas parciales: cada registro se maneja por separado; los
//! que fallan se reportan con su identificador para que la cola los
//! reentregue. El progreso parcial es seguro porque la ingesta es
//! idempotente (tokens + escrituras condicionales): la reentrega alcanza el
//! mismo estado terminal.

use log::warn;
use serde_json::Value;

use parcel_core::{EngineError, EventPipeline, KeyValueStore};
use parcel_domain::WorkflowEvent;

/// Resultado de procesar un lote.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub handled: usize,
    /// `(identificador del registro, error)` por cada registro fallido;
    /// estos deben reencolarse.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Procesa un lote crudo contra el pipeline.
pub fn handle_batch<S: KeyValueStore + Clone>(pipeline: &EventPipeline<S>, raw: &str)
                                              -> Result<BatchReport, EngineError> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::Validation(format!("malformed batch payload: {e}")))?;

    let mut report = BatchReport::default();
    match parsed {
        // Sobre de cola: Records[].body con el evento serializado.
        Value::Object(ref envelope) if envelope.contains_key("Records") => {
            let records = envelope.get("Records")
                                  .and_then(Value::as_array)
                                  .ok_or_else(|| EngineError::Validation("Records is not an array".to_string()))?;
            for (index, record) in records.iter().enumerate() {
                let record_id = record.get("messageId")
                                      .and_then(Value::as_str)
                                      .map(str::to_string)
                                      .unwrap_or_else(|| format!("record-{index}"));
                let outcome = record.get("body")
                                    .and_then(Value::as_str)
                                    .ok_or_else(|| "record lacks a string body".to_string())
                                    .and_then(|body| {
                                        serde_json::from_str::<WorkflowEvent>(body).map_err(|e| e.to_string())
                                    })
                                    .and_then(|event| pipeline.handle(&event).map_err(|e| e.to_string()));
                match outcome {
                    Ok(_) => report.handled += 1,
                    Err(reason) => {
                        warn!("entry:record-failed id={record_id} reason={reason}");
                        report.failed.push((record_id, reason));
                    }
                }
            }
        }
        // Invocación directa: array de eventos.
        Value::Array(items) => {
            for (index, item) in items.into_iter().enumerate() {
                let outcome = serde_json::from_value::<WorkflowEvent>(item)
                    .map_err(|e| e.to_string())
                    .and_then(|event| pipeline.handle(&event).map(|_| event.event_token()).map_err(|e| e.to_string()));
                match outcome {
                    Ok(_) => report.handled += 1,
                    Err(reason) => {
                        warn!("entry:event-failed index={index} reason={reason}");
                        report.failed.push((format!("event-{index}"), reason));
                    }
                }
            }
        }
        _ => {
            return Err(EngineError::Validation("batch payload must be a Records envelope or an event array"
                .to_string()));
        }
    }
    Ok(report)
}
