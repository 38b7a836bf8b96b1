//! Módulo: repositorio clave-valor de tabla única.
//!
//! Este módulo define la interfaz (trait) del repositorio y los tipos de su
//! superficie: claves, acciones de actualización tipadas, condiciones,
//! transacciones y consultas paginadas. La idea es que todas las entidades
//! vivan en una tabla lógica por `(pk, sk)` con tres índices secundarios
//! globales, y que el mapeo entidad ↔ ítem quede completamente fuera de los
//! motores.
//!
//! Decisión de diseño: la superficie de update/condition es tipada (enums de
//! acciones) en lugar de expresiones string de la plataforma; los motores no
//! parsean nada y el backend durable traduce al dialecto que necesite.
//!
//! Contrato principal:
//! - `update_item` es upsert y devuelve el ítem posterior, para que el
//!   llamador lea contadores post-incremento.
//! - `transact_write` es todo-o-nada y acepta `client_request_token`; repetir
//!   el mismo token es un no-op exitoso.
//! - `transact_write_chunked` trocea automáticamente al límite de 100 ítems
//!   de la plataforma.

pub mod error;
pub mod memory;
pub mod retry;

use serde_json::Value;

use crate::constants::TRANSACT_MAX_ITEMS;

pub use error::StoreError;
pub use memory::InMemoryKeyValueStore;
pub use retry::{with_retry, RetryPolicy};

/// Un ítem es un mapa plano de atributos JSON (incluye `pk`, `sk`,
/// `entityType` y las claves GSI presentes).
pub type Item = serde_json::Map<String, Value>;

/// Tablas lógicas. `Tracking` aloja ejecuciones fallidas, registros de
/// error, links y agregados; `State` aloja el último estado por ejecución
/// (reusa el mismo par de claves que FailedExecution, por eso es tabla
/// aparte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableId {
    Tracking,
    State,
}

impl TableId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableId::Tracking => "tracking",
            TableId::State => "state",
        }
    }
}

/// Clave primaria compuesta de un ítem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self { pk: pk.into(), sk: sk.into() }
    }
}

/// Índices consultables. El primario ordena por `sk`; cada GSI ordena por su
/// propia sort key y es disperso (ítems sin las claves del índice no
/// aparecen en él).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexId {
    Primary,
    Gsi1,
    Gsi2,
    Gsi3,
}

impl IndexId {
    /// Atributo de partición del índice.
    pub fn pk_attribute(&self) -> &'static str {
        match self {
            IndexId::Primary => "pk",
            IndexId::Gsi1 => "gsi1pk",
            IndexId::Gsi2 => "gsi2pk",
            IndexId::Gsi3 => "gsi3pk",
        }
    }

    /// Atributo de orden del índice.
    pub fn sk_attribute(&self) -> &'static str {
        match self {
            IndexId::Primary => "sk",
            IndexId::Gsi1 => "gsi1sk",
            IndexId::Gsi2 => "gsi2sk",
            IndexId::Gsi3 => "gsi3sk",
        }
    }
}

/// Acción individual de una actualización.
#[derive(Debug, Clone)]
pub enum UpdateAction {
    /// Fija el atributo al valor dado.
    Set(String, Value),
    /// Fija el atributo sólo si no existe todavía (equivalente a
    /// `if_not_exists` de la plataforma).
    SetIfAbsent(String, Value),
    /// Incremento atómico; el atributo ausente cuenta como 0.
    Add(String, i64),
    /// Elimina el atributo.
    Remove(String),
}

/// Expresión de actualización tipada (builder encadenable).
#[derive(Debug, Clone, Default)]
pub struct UpdateExpr {
    pub actions: Vec<UpdateAction>,
}

impl UpdateExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::Set(attribute.into(), value.into()));
        self
    }

    pub fn set_if_absent(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.actions.push(UpdateAction::SetIfAbsent(attribute.into(), value.into()));
        self
    }

    pub fn add(mut self, attribute: impl Into<String>, delta: i64) -> Self {
        self.actions.push(UpdateAction::Add(attribute.into(), delta));
        self
    }

    pub fn remove(mut self, attribute: impl Into<String>) -> Self {
        self.actions.push(UpdateAction::Remove(attribute.into()));
        self
    }
}

/// Condición evaluada contra el ítem previo (o su ausencia).
#[derive(Debug, Clone)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    Equals(String, Value),
    GreaterThan(String, i64),
}

/// Operación dentro de una transacción.
#[derive(Debug, Clone)]
pub enum TransactItem {
    Put { table: TableId, item: Item, condition: Option<Condition> },
    Update { table: TableId, key: ItemKey, expr: UpdateExpr, condition: Option<Condition> },
    Delete { table: TableId, key: ItemKey, condition: Option<Condition> },
    ConditionCheck { table: TableId, key: ItemKey, condition: Condition },
}

impl TransactItem {
    /// Clave `(tabla, pk, sk)` sobre la que opera el ítem transaccional.
    pub fn target(&self) -> (TableId, &str, &str) {
        match self {
            TransactItem::Put { table, item, .. } => {
                let pk = item.get("pk").and_then(Value::as_str).unwrap_or("");
                let sk = item.get("sk").and_then(Value::as_str).unwrap_or("");
                (*table, pk, sk)
            }
            TransactItem::Update { table, key, .. }
            | TransactItem::Delete { table, key, .. }
            | TransactItem::ConditionCheck { table, key, .. } => (*table, &key.pk, &key.sk),
        }
    }
}

/// Consulta paginada sobre un índice.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub table: TableId,
    pub index: IndexId,
    /// Valor exacto de la partición del índice.
    pub partition: String,
    /// Filtro `begins_with` sobre la sort key del índice.
    pub sk_prefix: Option<String>,
    /// `true` = ascendente (least primero); `false` = descendente.
    pub forward: bool,
    pub limit: Option<usize>,
    /// Cursor opaco devuelto por la página anterior.
    pub cursor: Option<String>,
    /// Filtro por `entityType` (se aplica antes del límite).
    pub entity_type: Option<String>,
}

impl QueryRequest {
    pub fn new(table: TableId, index: IndexId, partition: impl Into<String>) -> Self {
        Self { table,
               index,
               partition: partition.into(),
               sk_prefix: None,
               forward: true,
               limit: None,
               cursor: None,
               entity_type: None }
    }
}

/// Página de resultados; `cursor` presente cuando quedan más ítems.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub cursor: Option<String>,
}

/// Repositorio clave-valor de tabla única con índices secundarios.
///
/// La implementación en memoria es la referencia de semántica; el backend
/// durable debe mantener paridad exacta (mismas condiciones, mismos errores,
/// misma idempotencia de tokens).
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, table: TableId, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    /// Inserta o reemplaza el ítem completo. El ítem debe traer `pk` y `sk`.
    fn put_item(&self, table: TableId, item: Item, condition: Option<Condition>) -> Result<(), StoreError>;

    /// Upsert con acciones tipadas; devuelve el ítem posterior a la
    /// actualización (necesario para leer contadores post-incremento).
    fn update_item(&self, table: TableId, key: &ItemKey, expr: UpdateExpr, condition: Option<Condition>)
                   -> Result<Item, StoreError>;

    fn delete_item(&self, table: TableId, key: &ItemKey, condition: Option<Condition>) -> Result<(), StoreError>;

    /// Transacción todo-o-nada. Dos operaciones sobre el mismo ítem dentro de
    /// una transacción son inválidas (límite de la plataforma). Repetir un
    /// `client_request_token` ya aplicado es un no-op exitoso.
    fn transact_write(&self, items: Vec<TransactItem>, client_request_token: Option<String>)
                      -> Result<(), StoreError>;

    fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError>;

    fn batch_get(&self, table: TableId, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError>;

    /// Transacción troceada automáticamente al límite de la plataforma; cada
    /// trozo deriva su token del token base (`<token>-<n>`).
    fn transact_write_chunked(&self, items: Vec<TransactItem>, client_request_token: Option<String>)
                              -> Result<(), StoreError> {
        if items.len() <= TRANSACT_MAX_ITEMS {
            return self.transact_write(items, client_request_token);
        }
        for (chunk_index, chunk) in items.chunks(TRANSACT_MAX_ITEMS).enumerate() {
            let chunk_token = client_request_token.as_ref().map(|t| format!("{t}-{chunk_index}"));
            self.transact_write(chunk.to_vec(), chunk_token)?;
        }
        Ok(())
    }
}

/// Evalúa una condición contra el ítem previo (o su ausencia). Semántica
/// compartida por TODOS los backends: la paridad memoria ↔ durable depende
/// de que ambos llamen exactamente esta función.
pub fn eval_condition(existing: Option<&Item>, condition: &Condition) -> Result<(), String> {
    match condition {
        Condition::AttributeExists(attr) => match existing {
            Some(item) if item.contains_key(attr) => Ok(()),
            _ => Err(format!("attribute_exists({attr})")),
        },
        Condition::AttributeNotExists(attr) => match existing {
            Some(item) if item.contains_key(attr) => Err(format!("attribute_not_exists({attr})")),
            _ => Ok(()),
        },
        Condition::Equals(attr, expected) => match existing.and_then(|i| i.get(attr)) {
            Some(actual) if actual == expected => Ok(()),
            other => Err(format!("{attr} = {expected} (actual {other:?})")),
        },
        Condition::GreaterThan(attr, threshold) => {
            let actual = existing.and_then(|i| i.get(attr)).and_then(Value::as_i64).unwrap_or(0);
            if actual > *threshold {
                Ok(())
            } else {
                Err(format!("{attr} > {threshold} (actual {actual})"))
            }
        }
    }
}

/// Aplica una expresión de actualización (upsert) y devuelve el ítem
/// resultante. Igual que `eval_condition`, es la semántica canónica que los
/// backends comparten.
pub fn apply_update(existing: Option<Item>, key: &ItemKey, expr: &UpdateExpr) -> Result<Item, StoreError> {
    let mut item = existing.unwrap_or_else(|| {
                       let mut fresh = Item::new();
                       fresh.insert("pk".to_string(), Value::String(key.pk.clone()));
                       fresh.insert("sk".to_string(), Value::String(key.sk.clone()));
                       fresh
                   });
    for action in &expr.actions {
        match action {
            UpdateAction::Set(attr, value) => {
                item.insert(attr.clone(), value.clone());
            }
            UpdateAction::SetIfAbsent(attr, value) => {
                if !item.contains_key(attr) {
                    item.insert(attr.clone(), value.clone());
                }
            }
            UpdateAction::Add(attr, delta) => {
                let current = match item.get(attr) {
                    None => 0,
                    Some(v) => v.as_i64().ok_or_else(|| {
                                            StoreError::Validation(format!("ADD on non-numeric attribute {attr}"))
                                        })?,
                };
                item.insert(attr.clone(), Value::from(current + delta));
            }
            UpdateAction::Remove(attr) => {
                item.remove(attr);
            }
        }
    }
    Ok(item)
}

// Delegaciones para compartir un store entre motores sin acoplarlos a un
// contenedor concreto.
impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get_item(&self, table: TableId, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        (**self).get_item(table, key)
    }

    fn put_item(&self, table: TableId, item: Item, condition: Option<Condition>) -> Result<(), StoreError> {
        (**self).put_item(table, item, condition)
    }

    fn update_item(&self, table: TableId, key: &ItemKey, expr: UpdateExpr, condition: Option<Condition>)
                   -> Result<Item, StoreError> {
        (**self).update_item(table, key, expr, condition)
    }

    fn delete_item(&self, table: TableId, key: &ItemKey, condition: Option<Condition>) -> Result<(), StoreError> {
        (**self).delete_item(table, key, condition)
    }

    fn transact_write(&self, items: Vec<TransactItem>, client_request_token: Option<String>)
                      -> Result<(), StoreError> {
        (**self).transact_write(items, client_request_token)
    }

    fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError> {
        (**self).query(request)
    }

    fn batch_get(&self, table: TableId, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError> {
        (**self).batch_get(table, keys)
    }
}
