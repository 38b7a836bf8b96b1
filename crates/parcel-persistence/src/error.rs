//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a la taxonomía del repositorio.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use parcel_core::StoreError;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => StoreError::NotFound,
            // Una violación de unicidad en la tabla de tokens u otra carrera
            // de escritura equivale a contención del mismo ítem.
            PersistenceError::UniqueViolation(msg) => StoreError::TransactionConflict(msg),
            PersistenceError::SerializationConflict => {
                StoreError::TransactionConflict("serialization failure".to_string())
            }
            PersistenceError::TransientIo(msg) => StoreError::TransientIo(msg),
            PersistenceError::Unknown(msg) => classify_unknown(msg),
        }
    }
}

/// Mensajes que según el driver llegan como `Unknown` pero son claramente
/// transitorios; best-effort sin acoplar a SQLSTATE.
fn classify_unknown(msg: String) -> StoreError {
    let lowered = msg.to_lowercase();
    if lowered.contains("deadlock detected")
       || lowered.contains("could not serialize access due to concurrent update")
       || lowered.contains("connection closed")
       || lowered.contains("connection refused")
       || lowered.contains("timeout")
    {
        StoreError::TransientIo(msg)
    } else {
        StoreError::Fatal(msg)
    }
}
