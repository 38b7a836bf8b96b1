//! Errores del repositorio.
//! Taxonomía por clases de política de reintento, no por tipos del backend.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("item not found")]
    NotFound,
    #[error("condition failed: {0}")]
    ConditionFailed(String),
    #[error("throttled: {0}")]
    Throttled(String),
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),
    #[error("transient IO: {0}")]
    TransientIo(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Clases que ameritan reintento con backoff. `ConditionFailed` y
    /// `Validation` nunca se reintentan: repetirlas produce el mismo
    /// resultado.
    pub fn is_retryable(&self) -> bool {
        matches!(self,
                 StoreError::Throttled(_) | StoreError::TransactionConflict(_) | StoreError::TransientIo(_))
    }
}
