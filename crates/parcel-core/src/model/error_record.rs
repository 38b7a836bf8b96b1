//! ErrorRecord: una fila por código de error único en el sistema.
//!
//! Nace con el primer evento que trae su código y vive para siempre (el
//! estatus sí cambia). `totalCount` es monotónico y se incrementa con ADD
//! atómico; las sort keys GSI2/GSI3 se reescriben después de cada
//! incremento porque embeben el contador post-incremento.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parcel_domain::{error_type, ErrorStatus};

use crate::constants::{ENTITY_ERROR_RECORD, METRIC_ERRORCOUNT_ERROR, TYPE_ERROR};
use crate::errors::EngineError;
use crate::keys::{error_key, error_record_gsi2_sk, error_record_gsi3_sk};
use crate::model::{entity_from_item, entity_to_item};
use crate::store::{Item, ItemKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub error_code: String,
    /// Primeros 2 caracteres del código (o el código completo si es más
    /// corto).
    pub error_type: String,
    /// Detalles JSON del primer avistamiento (deterministas en replay).
    #[serde(default)]
    pub error_details: Value,
    pub total_count: u64,
    pub status: ErrorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn key_for(code: &str) -> ItemKey {
        let k = error_key(code);
        ItemKey::new(k.clone(), k)
    }

    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.error_code)
    }

    /// Sort key GSI2 re-derivada de los atributos actuales.
    pub fn gsi2_sk(&self) -> String {
        error_record_gsi2_sk(self.status, self.total_count, &self.error_code)
    }

    /// Sort key GSI3 re-derivada de los atributos actuales.
    pub fn gsi3_sk(&self) -> String {
        error_record_gsi3_sk(&self.error_type, self.status, self.total_count, &self.error_code)
    }

    pub fn to_item(&self) -> Result<Item, EngineError> {
        let mut item = entity_to_item(self)?;
        let key = self.key();
        item.insert("pk".to_string(), Value::String(key.pk.clone()));
        item.insert("sk".to_string(), Value::String(key.sk));
        item.insert("entityType".to_string(), Value::String(ENTITY_ERROR_RECORD.to_string()));
        item.insert("gsi1pk".to_string(), Value::String(TYPE_ERROR.to_string()));
        item.insert("gsi1sk".to_string(), Value::String(key.pk));
        item.insert("gsi2pk".to_string(), Value::String(TYPE_ERROR.to_string()));
        item.insert("gsi2sk".to_string(), Value::String(self.gsi2_sk()));
        item.insert("gsi3pk".to_string(), Value::String(METRIC_ERRORCOUNT_ERROR.to_string()));
        item.insert("gsi3sk".to_string(), Value::String(self.gsi3_sk()));
        Ok(item)
    }

    pub fn from_item(item: &Item) -> Result<Self, EngineError> {
        entity_from_item(item)
    }

    /// Tipo de error derivado del código (mismo contrato que el dominio).
    pub fn type_of(code: &str) -> &str {
        error_type(code)
    }
}
