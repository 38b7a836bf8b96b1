//! FailedExecution: una fila por ejecución fallida.
//!
//! Ciclo de vida: nace con el primer evento fallido de la ejecución y se
//! borra cuando `openErrorCount` llega a 0, cuando la auto-reparación
//! tiene éxito o cuando agota reintentos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parcel_domain::{ErrorStatus, SourceRef};

use crate::constants::{ENTITY_FAILED_EXECUTION, METRIC_ERRORCOUNT};
use crate::errors::EngineError;
use crate::keys::{execution_key, failed_execution_gsi1_sk, failed_execution_gsi3_sk};
use crate::model::{entity_from_item, entity_to_item};
use crate::store::{Item, ItemKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedExecution {
    pub execution_id: String,
    pub county: String,
    /// Prefijo de código compartido por TODOS los errores acumulados de la
    /// ejecución; vacío en cuanto los códigos mezclan tipos.
    #[serde(default)]
    pub error_type: String,
    pub unique_error_count: u64,
    pub total_occurrences: u64,
    /// Errores únicos todavía en estatus `failed` para esta ejecución.
    pub open_error_count: u64,
    pub status: ErrorStatus,
    #[serde(default)]
    pub prepared_s3_uri: Option<String>,
    #[serde(default)]
    pub errors_s3_uri: Option<String>,
    #[serde(default)]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub task_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FailedExecution {
    pub fn key_for(execution_id: &str) -> ItemKey {
        let k = execution_key(execution_id);
        ItemKey::new(k.clone(), k)
    }

    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.execution_id)
    }

    /// Ítem completo con claves primarias, GSI1 y GSI3 derivadas.
    pub fn to_item(&self) -> Result<Item, EngineError> {
        let mut item = entity_to_item(self)?;
        let key = self.key();
        item.insert("pk".to_string(), Value::String(key.pk));
        item.insert("sk".to_string(), Value::String(key.sk));
        item.insert("entityType".to_string(), Value::String(ENTITY_FAILED_EXECUTION.to_string()));
        item.insert("gsi1pk".to_string(), Value::String(METRIC_ERRORCOUNT.to_string()));
        item.insert("gsi1sk".to_string(),
                    Value::String(failed_execution_gsi1_sk(self.open_error_count, &self.execution_id)));
        item.insert("gsi3pk".to_string(), Value::String(METRIC_ERRORCOUNT.to_string()));
        item.insert("gsi3sk".to_string(),
                    Value::String(failed_execution_gsi3_sk(&self.error_type,
                                                           self.status,
                                                           self.open_error_count,
                                                           &self.execution_id)));
        Ok(item)
    }

    pub fn from_item(item: &Item) -> Result<Self, EngineError> {
        entity_from_item(item)
    }
}
