//! Motor de estado y agregados por paso.
//!
//! Rol en el flujo:
//! - Mantiene `ExecutionState` (último fase/paso/bucket por ejecución) y los
//!   contadores `StepAggregate` por celda (county, dg, fase, paso).
//! - Una transición de celda decrementa el bucket viejo (guardado contra
//!   negativos) e incrementa el nuevo en la misma transacción, junto con la
//!   actualización optimista del estado (`version`).
//!
//! Orden:
//! - Los eventos de una misma ejecución llegan serializados por el bus; dos
//!   entregas concurrentes se resuelven con la condición sobre `version`: el
//!   perdedor relee y, si su evento ya quedó reflejado, lo descarta como
//!   no-op.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use parcel_domain::{Bucket, WorkflowEvent};

use crate::constants::ENTITY_STEP_AGGREGATE;
use crate::errors::EngineError;
use crate::model::{attr, ExecutionState, StepAggregate};
use crate::store::{with_retry, Condition, KeyValueStore, RetryPolicy, StoreError, TableId, TransactItem,
                   UpdateExpr};

/// Resultado de aplicar un evento al estado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    /// Primera vez que se ve la ejecución.
    Created,
    /// La celda y el bucket no cambiaron: no-op.
    Unchanged,
    Transitioned { from: Bucket, to: Bucket },
}

pub struct StateEngine<S: KeyValueStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KeyValueStore> StateEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store, retry: RetryPolicy::quick() }
    }

    /// Aplica un evento: crea el estado, lo deja igual o lo transiciona.
    pub fn apply(&self, event: &WorkflowEvent) -> Result<StateOutcome, EngineError> {
        event.validate()?;
        let bucket = event.status.bucket();
        let token = event.event_token();
        let key = ExecutionState::key_for(&event.execution_id);

        let mut attempts = 0u32;
        loop {
            let now = Utc::now();
            let current = with_retry(&self.retry, || self.store.get_item(TableId::State, &key))?;
            let result = match &current {
                None => self.create(event, bucket, &token, &now),
                Some(item) => {
                    let state = ExecutionState::from_item(item)?;
                    let same_cell = state.cell()
                                    == (event.county.as_str(), event.data_group(), event.phase.as_str(),
                                        event.step.as_str());
                    if same_cell && state.bucket == bucket {
                        return Ok(StateOutcome::Unchanged);
                    }
                    self.transition(event, &state, bucket, &token, &now)
                }
            };
            match result {
                Err(EngineError::Store(StoreError::ConditionFailed(reason))) if attempts < 3 => {
                    // Perdimos la carrera optimista: releer y re-decidir. Si
                    // el evento era stale, la relectura lo convierte en no-op.
                    debug!("state:optimistic-retry execution_id={} reason={}", event.execution_id, reason);
                    attempts += 1;
                }
                other => return other,
            }
        }
    }

    fn create(&self, event: &WorkflowEvent, bucket: Bucket, token: &str, now: &DateTime<Utc>)
              -> Result<StateOutcome, EngineError> {
        let state = ExecutionState { execution_id: event.execution_id.clone(),
                                     county: event.county.clone(),
                                     data_group_label: event.data_group().to_string(),
                                     phase: event.phase.clone(),
                                     step: event.step.clone(),
                                     bucket,
                                     raw_status: event.status,
                                     last_event_time: *now,
                                     version: 1,
                                     created_at: *now,
                                     updated_at: *now };
        let item = state.to_item()?;
        let aggregate_key = StepAggregate::key_for(&event.county, event.data_group(), &event.phase, &event.step);
        let tx = vec![TransactItem::Put { table: TableId::State,
                                          item,
                                          condition:
                                              Some(Condition::AttributeNotExists("pk".to_string())) },
                      TransactItem::Update { table: TableId::Tracking,
                                             key: aggregate_key,
                                             expr: aggregate_upsert(&event.county, event.data_group(),
                                                                    &event.phase, &event.step, now)
                                                       .add(bucket.counter_attribute(), 1),
                                             condition: None }];
        with_retry(&self.retry, || self.store.transact_write(tx.clone(), Some(token.to_string())))?;
        Ok(StateOutcome::Created)
    }

    fn transition(&self, event: &WorkflowEvent, state: &ExecutionState, bucket: Bucket, token: &str,
                  now: &DateTime<Utc>)
                  -> Result<StateOutcome, EngineError> {
        let old_key = StepAggregate::key_for(&state.county, &state.data_group_label, &state.phase, &state.step);
        let new_key = StepAggregate::key_for(&event.county, event.data_group(), &event.phase, &event.step);
        let mut tx: Vec<TransactItem> = Vec::with_capacity(3);

        if old_key == new_key {
            // Sólo cambió el bucket dentro de la misma celda: una única
            // actualización combinada (la plataforma no admite dos
            // operaciones sobre el mismo ítem por transacción).
            tx.push(TransactItem::Update { table: TableId::Tracking,
                                           key: new_key,
                                           expr: aggregate_upsert(&event.county, event.data_group(),
                                                                  &event.phase, &event.step, now)
                                                     .add(state.bucket.counter_attribute(), -1)
                                                     .add(bucket.counter_attribute(), 1),
                                           condition:
                                               Some(Condition::GreaterThan(state.bucket
                                                                                .counter_attribute()
                                                                                .to_string(),
                                                                           0)) });
        } else {
            // Decremento guardado contra negativos: si la celda vieja ya está
            // en cero (pérdida previa), se omite el decremento y se registra.
            let old_item = with_retry(&self.retry, || self.store.get_item(TableId::Tracking, &old_key))?;
            let old_count = match &old_item {
                Some(item) => StepAggregate::from_item(item)?.bucket_count(state.bucket),
                None => 0,
            };
            if old_count > 0 {
                tx.push(TransactItem::Update { table: TableId::Tracking,
                                               key: old_key,
                                               expr: UpdateExpr::new().add(state.bucket.counter_attribute(), -1)
                                                                      .set("updatedAt", attr(now)),
                                               condition:
                                                   Some(Condition::GreaterThan(state.bucket
                                                                                    .counter_attribute()
                                                                                    .to_string(),
                                                                               0)) });
            } else {
                warn!("state:aggregate-underflow execution_id={} cell={:?} bucket={}",
                      event.execution_id,
                      state.cell(),
                      state.bucket.as_str());
            }
            tx.push(TransactItem::Update { table: TableId::Tracking,
                                           key: new_key,
                                           expr: aggregate_upsert(&event.county, event.data_group(),
                                                                  &event.phase, &event.step, now)
                                                     .add(bucket.counter_attribute(), 1),
                                           condition: None });
        }

        // Concurrencia optimista sobre la versión del estado.
        let state_expr = UpdateExpr::new().set("county", event.county.as_str())
                                          .set("dataGroupLabel", event.data_group())
                                          .set("phase", event.phase.as_str())
                                          .set("step", event.step.as_str())
                                          .set("bucket", attr(&bucket))
                                          .set("rawStatus", attr(&event.status))
                                          .set("lastEventTime", attr(now))
                                          .set("updatedAt", attr(now))
                                          .set("version", serde_json::Value::from(state.version + 1));
        tx.push(TransactItem::Update { table: TableId::State,
                                       key: state.key(),
                                       expr: state_expr,
                                       condition:
                                           Some(Condition::Equals("version".to_string(),
                                                                  serde_json::Value::from(state.version))) });

        with_retry(&self.retry, || self.store.transact_write(tx.clone(), Some(token.to_string())))?;
        Ok(StateOutcome::Transitioned { from: state.bucket, to: bucket })
    }
}

/// Upsert base de una celda de agregación (atributos + claves GSI; los
/// contadores los agrega el llamador).
fn aggregate_upsert(county: &str, data_group: &str, phase: &str, step: &str, now: &DateTime<Utc>) -> UpdateExpr {
    UpdateExpr::new().set("county", county)
                     .set("dataGroupLabel", data_group)
                     .set("phase", phase)
                     .set("step", step)
                     .set("entityType", ENTITY_STEP_AGGREGATE)
                     .set_if_absent("createdAt", attr(now))
                     .set("updatedAt", attr(now))
                     .set("gsi1pk", format!("AGG#COUNTY#{county}"))
                     .set("gsi1sk", format!("DG#{data_group}#PHASE#{phase}#STEP#{step}"))
}
