//! StepAggregate: contadores corrientes por celda (county, dg, fase, paso).
//!
//! Las celdas se crean al primer uso y persisten; los contadores pueden
//! llegar a cero pero la fila queda. El GSI1 ofrece el corte alterno por
//! condado a través de data-groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parcel_domain::Bucket;

use crate::constants::ENTITY_STEP_AGGREGATE;
use crate::errors::EngineError;
use crate::keys::{aggregate_pk, aggregate_sk};
use crate::model::{entity_from_item, entity_to_item};
use crate::store::{Item, ItemKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepAggregate {
    pub county: String,
    #[serde(default)]
    pub data_group_label: String,
    pub phase: String,
    pub step: String,
    #[serde(default)]
    pub in_progress_count: i64,
    #[serde(default)]
    pub failed_count: i64,
    #[serde(default)]
    pub succeeded_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepAggregate {
    pub fn key_for(county: &str, data_group: &str, phase: &str, step: &str) -> ItemKey {
        ItemKey::new(aggregate_pk(county, data_group), aggregate_sk(phase, step))
    }

    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.county, &self.data_group_label, &self.phase, &self.step)
    }

    /// Contador del bucket pedido.
    pub fn bucket_count(&self, bucket: Bucket) -> i64 {
        match bucket {
            Bucket::InProgress => self.in_progress_count,
            Bucket::Failed => self.failed_count,
            Bucket::Succeeded => self.succeeded_count,
        }
    }

    pub fn to_item(&self) -> Result<Item, EngineError> {
        let mut item = entity_to_item(self)?;
        let key = self.key();
        item.insert("pk".to_string(), Value::String(key.pk));
        item.insert("sk".to_string(), Value::String(key.sk));
        item.insert("entityType".to_string(), Value::String(ENTITY_STEP_AGGREGATE.to_string()));
        item.insert("gsi1pk".to_string(), Value::String(format!("AGG#COUNTY#{}", self.county)));
        item.insert("gsi1sk".to_string(),
                    Value::String(format!("DG#{}#PHASE#{}#STEP#{}",
                                          self.data_group_label, self.phase, self.step)));
        Ok(item)
    }

    pub fn from_item(item: &Item) -> Result<Self, EngineError> {
        entity_from_item(item)
    }
}
