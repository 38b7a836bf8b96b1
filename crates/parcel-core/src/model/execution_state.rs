//! ExecutionState: último (fase, paso, bucket) conocido por ejecución.
//!
//! Vive en la tabla lógica `state` (reusa el par de claves de
//! FailedExecution). Se crea con el primer evento de la ejecución y sólo se
//! actualiza después; `version` es el contador de concurrencia optimista.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parcel_domain::{Bucket, ExecutionStatus};

use crate::constants::ENTITY_EXECUTION_STATE;
use crate::errors::EngineError;
use crate::keys::execution_key;
use crate::model::{entity_from_item, entity_to_item};
use crate::store::{Item, ItemKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub execution_id: String,
    pub county: String,
    #[serde(default)]
    pub data_group_label: String,
    pub phase: String,
    pub step: String,
    pub bucket: Bucket,
    /// Estatus crudo original, preservado junto al bucket normalizado.
    pub raw_status: ExecutionStatus,
    pub last_event_time: DateTime<Utc>,
    /// Monotónico; condición de las transiciones de celda.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn key_for(execution_id: &str) -> ItemKey {
        let k = execution_key(execution_id);
        ItemKey::new(k.clone(), k)
    }

    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.execution_id)
    }

    /// Celda de agregación a la que pertenece este estado.
    pub fn cell(&self) -> (&str, &str, &str, &str) {
        (&self.county, &self.data_group_label, &self.phase, &self.step)
    }

    pub fn to_item(&self) -> Result<Item, EngineError> {
        let mut item = entity_to_item(self)?;
        let key = self.key();
        item.insert("pk".to_string(), Value::String(key.pk));
        item.insert("sk".to_string(), Value::String(key.sk));
        item.insert("entityType".to_string(), Value::String(ENTITY_EXECUTION_STATE.to_string()));
        Ok(item)
    }

    pub fn from_item(item: &Item) -> Result<Self, EngineError> {
        entity_from_item(item)
    }
}
