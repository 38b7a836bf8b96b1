//! Implementación en memoria del `KeyValueStore`.
//!
//! - Es la referencia de semántica: condiciones, transacciones, tokens de
//!   idempotencia y paginación se comportan aquí exactamente como se espera
//!   del backend durable.
//! - Thread-safe: los motores la comparten detrás de `Arc` y el sistema es
//!   paralelo entre eventos.
//! - Los índices secundarios se resuelven por proyección sobre los atributos
//!   `gsiNpk`/`gsiNsk` del ítem (índices dispersos: sin atributos, el ítem
//!   no aparece en el índice).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use serde_json::Value;

use super::error::StoreError;
use super::{apply_update, eval_condition, Condition, Item, ItemKey, KeyValueStore, QueryPage, QueryRequest,
            TableId, TransactItem, UpdateExpr};

type Table = BTreeMap<(String, String), Item>;

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    tables: Mutex<HashMap<TableId, Table>>,
    applied_tokens: DashMap<String, ()>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TableId, Table>>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Fatal("store lock poisoned".to_string()))
    }

    /// Cantidad total de ítems en una tabla (diagnóstico/tests).
    pub fn len(&self, table: TableId) -> usize {
        self.lock().map(|t| t.get(&table).map(|m| m.len()).unwrap_or(0)).unwrap_or(0)
    }

    pub fn is_empty(&self, table: TableId) -> bool {
        self.len(table) == 0
    }

    /// Snapshot completo de una tabla, en orden de clave primaria. Lo usan
    /// los tests de invariantes para comparar estados replay-vs-replay.
    pub fn dump(&self, table: TableId) -> Vec<Item> {
        self.lock()
            .map(|t| t.get(&table).map(|m| m.values().cloned().collect()).unwrap_or_default())
            .unwrap_or_default()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get_item(&self, table: TableId, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.get(&table).and_then(|t| t.get(&(key.pk.clone(), key.sk.clone()))).cloned())
    }

    fn put_item(&self, table: TableId, item: Item, condition: Option<Condition>) -> Result<(), StoreError> {
        let pk = item.get("pk").and_then(Value::as_str).map(str::to_string);
        let sk = item.get("sk").and_then(Value::as_str).map(str::to_string);
        let (pk, sk) = match (pk, sk) {
            (Some(pk), Some(sk)) => (pk, sk),
            _ => return Err(StoreError::Validation("put_item requires string pk and sk attributes".to_string())),
        };
        let mut tables = self.lock()?;
        let slot = tables.entry(table).or_default();
        if let Some(cond) = &condition {
            eval_condition(slot.get(&(pk.clone(), sk.clone())), cond).map_err(StoreError::ConditionFailed)?;
        }
        slot.insert((pk, sk), item);
        Ok(())
    }

    fn update_item(&self, table: TableId, key: &ItemKey, expr: UpdateExpr, condition: Option<Condition>)
                   -> Result<Item, StoreError> {
        let mut tables = self.lock()?;
        let slot = tables.entry(table).or_default();
        let map_key = (key.pk.clone(), key.sk.clone());
        let existing = slot.get(&map_key).cloned();
        if let Some(cond) = &condition {
            eval_condition(existing.as_ref(), cond).map_err(StoreError::ConditionFailed)?;
        }
        let updated = apply_update(existing, key, &expr)?;
        slot.insert(map_key, updated.clone());
        Ok(updated)
    }

    fn delete_item(&self, table: TableId, key: &ItemKey, condition: Option<Condition>) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let slot = tables.entry(table).or_default();
        let map_key = (key.pk.clone(), key.sk.clone());
        if let Some(cond) = &condition {
            eval_condition(slot.get(&map_key), cond).map_err(StoreError::ConditionFailed)?;
        }
        slot.remove(&map_key);
        Ok(())
    }

    fn transact_write(&self, items: Vec<TransactItem>, client_request_token: Option<String>)
                      -> Result<(), StoreError> {
        if let Some(token) = &client_request_token {
            if self.applied_tokens.contains_key(token) {
                // Replay del mismo token: no-op exitoso.
                return Ok(());
            }
        }

        // La plataforma prohíbe dos operaciones sobre el mismo ítem dentro
        // de una transacción.
        for (i, a) in items.iter().enumerate() {
            for b in items.iter().skip(i + 1) {
                if a.target() == b.target() {
                    return Err(StoreError::Validation(format!("duplicate item in transaction: {:?}",
                                                              a.target())));
                }
            }
        }

        let mut tables = self.lock()?;

        // Fase 1: todas las condiciones contra el estado actual.
        for op in &items {
            let (table, pk, sk) = op.target();
            let existing = tables.get(&table).and_then(|t| t.get(&(pk.to_string(), sk.to_string())));
            let condition = match op {
                TransactItem::Put { condition, .. }
                | TransactItem::Update { condition, .. }
                | TransactItem::Delete { condition, .. } => condition.as_ref(),
                TransactItem::ConditionCheck { condition, .. } => Some(condition),
            };
            if let Some(cond) = condition {
                eval_condition(existing, cond).map_err(StoreError::ConditionFailed)?;
            }
        }

        // Fase 2: aplicar (ya no puede fallar ninguna condición).
        for op in items {
            match op {
                TransactItem::Put { table, item, .. } => {
                    let pk = item.get("pk").and_then(Value::as_str).unwrap_or("").to_string();
                    let sk = item.get("sk").and_then(Value::as_str).unwrap_or("").to_string();
                    if pk.is_empty() || sk.is_empty() {
                        return Err(StoreError::Validation("transact Put requires pk and sk".to_string()));
                    }
                    tables.entry(table).or_default().insert((pk, sk), item);
                }
                TransactItem::Update { table, key, expr, .. } => {
                    let slot = tables.entry(table).or_default();
                    let map_key = (key.pk.clone(), key.sk.clone());
                    let updated = apply_update(slot.get(&map_key).cloned(), &key, &expr)?;
                    slot.insert(map_key, updated);
                }
                TransactItem::Delete { table, key, .. } => {
                    tables.entry(table).or_default().remove(&(key.pk, key.sk));
                }
                TransactItem::ConditionCheck { .. } => {}
            }
        }

        if let Some(token) = client_request_token {
            self.applied_tokens.insert(token, ());
        }
        Ok(())
    }

    fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError> {
        let tables = self.lock()?;
        let Some(table) = tables.get(&request.table) else {
            return Ok(QueryPage::default());
        };

        let pk_attr = request.index.pk_attribute();
        let sk_attr = request.index.sk_attribute();

        // Proyección del índice: (sort, pk, sk) por ítem que pertenece a la
        // partición pedida. Los ítems sin claves del índice no aparecen.
        let mut projected: Vec<(String, String, String, &Item)> = Vec::new();
        for ((pk, sk), item) in table.iter() {
            let Some(part) = item.get(pk_attr).and_then(Value::as_str) else { continue };
            if part != request.partition {
                continue;
            }
            let Some(sort) = item.get(sk_attr).and_then(Value::as_str) else { continue };
            if let Some(prefix) = &request.sk_prefix {
                if !sort.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if let Some(entity) = &request.entity_type {
                if item.get("entityType").and_then(Value::as_str) != Some(entity.as_str()) {
                    continue;
                }
            }
            projected.push((sort.to_string(), pk.clone(), sk.clone(), item));
        }

        projected.sort_by(|a, b| (&a.0, &a.1, &a.2).cmp(&(&b.0, &b.1, &b.2)));
        if !request.forward {
            projected.reverse();
        }

        // Cursor: tupla (sort, pk, sk) del último ítem devuelto; se continúa
        // estrictamente después en el orden de recorrido.
        if let Some(cursor) = &request.cursor {
            let decoded: (String, String, String) = serde_json::from_str(cursor)
                .map_err(|e| StoreError::Validation(format!("bad cursor: {e}")))?;
            let position = projected.iter().position(|(sort, pk, sk, _)| (sort, pk, sk)
                                                                          == (&decoded.0, &decoded.1, &decoded.2));
            match position {
                Some(idx) => projected.drain(..=idx),
                None => projected.drain(..0),
            };
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let mut items = Vec::new();
        let mut cursor = None;
        for (idx, (sort, pk, sk, item)) in projected.iter().enumerate() {
            if items.len() == limit {
                break;
            }
            items.push((*item).clone());
            let is_last_returned = items.len() == limit && idx + 1 < projected.len();
            if is_last_returned {
                cursor = Some(serde_json::to_string(&(sort, pk, sk))
                                  .map_err(|e| StoreError::Fatal(format!("cursor encode: {e}")))?);
            }
        }
        Ok(QueryPage { items, cursor })
    }

    fn batch_get(&self, table: TableId, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError> {
        let tables = self.lock()?;
        let Some(slot) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(keys.iter()
               .filter_map(|k| slot.get(&(k.pk.clone(), k.sk.clone())).cloned())
               .collect())
    }
}
