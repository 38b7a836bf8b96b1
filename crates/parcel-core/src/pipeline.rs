//! Puerta de entrada de eventos: ingesta + estado + métrica.
//!
//! Es lo que llama el entry point (cola, bus o invocación directa) por cada
//! evento parseado. El progreso parcial es seguro: los tokens de
//! idempotencia y las escrituras condicionales hacen que la redelivery
//! alcance el mismo estado terminal.

use std::sync::Arc;

use log::debug;

use parcel_domain::WorkflowEvent;
use parcel_metrics::{phase_sample, MetricsSink};

use crate::errors::EngineError;
use crate::ingest::{IngestEngine, IngestOutcome};
use crate::state::{StateEngine, StateOutcome};
use crate::store::KeyValueStore;

/// Resultado combinado del manejo de un evento.
#[derive(Debug)]
pub struct PipelineReport {
    pub ingest: IngestOutcome,
    pub state: StateOutcome,
}

pub struct EventPipeline<S: KeyValueStore + Clone> {
    ingest: IngestEngine<S>,
    state: StateEngine<S>,
    sink: Arc<dyn MetricsSink>,
}

impl<S: KeyValueStore + Clone> EventPipeline<S> {
    pub fn new(store: S, sink: Arc<dyn MetricsSink>) -> Self {
        Self { ingest: IngestEngine::new(store.clone()),
               state: StateEngine::new(store),
               sink }
    }

    /// Maneja un evento completo. La métrica de fase se emite SIEMPRE
    /// (haya o no errores) y su falla se propaga: perder visibilidad se
    /// trata como bug de datos.
    pub fn handle(&self, event: &WorkflowEvent) -> Result<PipelineReport, EngineError> {
        debug!("pipeline:event execution_id={} phase={} step={} status={}",
               event.execution_id,
               event.phase,
               event.step,
               event.status.as_str());
        let ingest = self.ingest.ingest(event)?;
        let state = self.state.apply(event)?;
        self.sink.publish(&phase_sample(event))?;
        Ok(PipelineReport { ingest, state })
    }
}
