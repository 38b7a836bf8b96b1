//! Errores semánticos de los motores del núcleo.

use thiserror::Error;

use parcel_domain::DomainError;
use parcel_metrics::MetricsError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl EngineError {
    /// Reutiliza la clasificación de reintento del repositorio; todo lo
    /// demás es no-reintentable para el llamador.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_retryable())
    }
}
