//! Errores del loop de reparación.

use thiserror::Error;

use parcel_core::EngineError;
use parcel_metrics::MetricsError;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("object store: {0}")]
    Blob(String),
    #[error("queue: {0}")]
    Queue(String),
    #[error("agent: {0}")]
    Agent(String),
    #[error("workflow callback: {0}")]
    Callback(String),
    /// El validador rechazó el parche. Si emitió un nuevo CSV de errores, la
    /// URI viaja tipada (el fallback regex sólo aplica a mensajes crudos).
    #[error("validator rejected the fix: {message}")]
    ValidatorRejected {
        message: String,
        new_errors_uri: Option<String>,
    },
    #[error("errors csv: {0}")]
    Csv(String),
    /// Una llamada externa excedió su plazo. Cancelación cooperativa: el
    /// intento en curso falla y el loop decide si reintenta.
    #[error("timed out after {seconds}s waiting for {operation}")]
    Timeout { operation: &'static str, seconds: u64 },
    #[error("temp workspace: {0}")]
    Workspace(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
