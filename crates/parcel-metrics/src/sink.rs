//! Sink de métricas: trait + backends de referencia.
//!
//! El backend real (CloudWatch u otro) vive fuera de este core; aquí se
//! proveen un sink en memoria (tests, demo) y uno que escribe al log.

use std::sync::Mutex;

use log::info;
use thiserror::Error;

use crate::sample::MetricSample;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric publish failed: {0}")]
    Publish(String),
}

/// Destino de muestras. La publicación que falla debe propagarse.
pub trait MetricsSink: Send + Sync {
    fn publish(&self, sample: &MetricSample) -> Result<(), MetricsError>;
}

/// Sink en memoria para tests y el binario demo.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    samples: Mutex<Vec<MetricSample>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copia de las muestras acumuladas hasta ahora.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().expect("metrics sink poisoned").clone()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn publish(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        self.samples
            .lock()
            .map_err(|_| MetricsError::Publish("sink poisoned".to_string()))?
            .push(sample.clone());
        Ok(())
    }
}

/// Sink que emite cada muestra por el log (útil en desarrollo).
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn publish(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        info!("metric namespace={} name={} value={} dims={:?}",
              sample.namespace,
              sample.name,
              sample.value,
              sample.dimensions);
        Ok(())
    }
}
