//! Entidades persistidas y su mapeo a ítems del repositorio.
//!
//! Rol en el flujo:
//! - Cada entidad sabe derivar su clave primaria y sus claves GSI a partir
//!   de sus atributos base (invariante: las sort keys siempre son
//!   re-derivables; tras cada mutación de contador se reescriben con las
//!   mismas funciones de `keys`).
//! - El mapeo ítem ↔ struct es serde plano (camelCase); los atributos de
//!   índice (`pk`, `sk`, `gsiNpk`, `gsiNsk`, `entityType`) se inyectan al
//!   serializar y se ignoran al deserializar.

pub mod error_record;
pub mod execution_state;
pub mod failed_execution;
pub mod link;
pub mod step_aggregate;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::EngineError;
use crate::store::Item;

pub use error_record::ErrorRecord;
pub use execution_state::ExecutionState;
pub use failed_execution::FailedExecution;
pub use link::ExecutionErrorLink;
pub use step_aggregate::StepAggregate;

/// Serializa una entidad a mapa de atributos (sin claves de índice aún).
pub(crate) fn entity_to_item<T: Serialize>(entity: &T) -> Result<Item, EngineError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(EngineError::Serialization(format!("entity did not serialize to an object: {other}"))),
        Err(e) => Err(EngineError::Serialization(e.to_string())),
    }
}

/// Reconstruye una entidad desde un ítem; los atributos de índice y
/// cualquier atributo desconocido se ignoran.
pub(crate) fn entity_from_item<T: DeserializeOwned>(item: &Item) -> Result<T, EngineError> {
    serde_json::from_value(Value::Object(item.clone())).map_err(|e| EngineError::Serialization(e.to_string()))
}

/// Serialización infalible de valores de dominio a atributos JSON (estatus,
/// buckets, timestamps).
pub(crate) fn attr<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("serialize attribute value")
}
