//! ExecutionErrorLink: arista N:M entre ejecución y código de error.
//!
//! Lleva el conteo de ocurrencias dentro de esa única ejecución y el
//! estatus del error en esa ejecución. El GSI1 invierte la arista
//! (`ERROR#<code>` → `EXECUTION#<id>`) para el lookup inverso del mutador.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parcel_domain::ErrorStatus;

use crate::constants::ENTITY_EXECUTION_ERROR_LINK;
use crate::errors::EngineError;
use crate::keys::{error_key, execution_key};
use crate::model::{entity_from_item, entity_to_item};
use crate::store::{Item, ItemKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorLink {
    pub execution_id: String,
    pub error_code: String,
    pub county: String,
    /// Ocurrencias dentro de esta ejecución.
    pub occurrences: u64,
    pub status: ErrorStatus,
    #[serde(default)]
    pub error_details: Value,
}

impl ExecutionErrorLink {
    pub fn key_for(execution_id: &str, code: &str) -> ItemKey {
        ItemKey::new(execution_key(execution_id), error_key(code))
    }

    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.execution_id, &self.error_code)
    }

    pub fn to_item(&self) -> Result<Item, EngineError> {
        let mut item = entity_to_item(self)?;
        let key = self.key();
        item.insert("pk".to_string(), Value::String(key.pk.clone()));
        item.insert("sk".to_string(), Value::String(key.sk.clone()));
        item.insert("entityType".to_string(), Value::String(ENTITY_EXECUTION_ERROR_LINK.to_string()));
        // Arista inversa: partición por error, orden por ejecución.
        item.insert("gsi1pk".to_string(), Value::String(key.sk));
        item.insert("gsi1sk".to_string(), Value::String(key.pk));
        Ok(item)
    }

    pub fn from_item(item: &Item) -> Result<Self, EngineError> {
        entity_from_item(item)
    }
}
