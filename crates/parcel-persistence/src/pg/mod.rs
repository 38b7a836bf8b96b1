//! Implementación Postgres (Diesel) del `KeyValueStore` del core.
//!
//! Objetivo general del módulo:
//! - Proveer una capa durable con paridad 1:1 respecto al backend en
//!   memoria: las condiciones y las actualizaciones se evalúan con las
//!   MISMAS funciones (`eval_condition` / `apply_update`) del core, bajo
//!   locks de fila (`FOR UPDATE`) dentro de una transacción Diesel.
//! - Materializar los índices secundarios como columnas extraídas
//!   (`gsiNpk`/`gsiNsk`) con índices parciales; el ítem completo viaja en
//!   `attributes` (JSONB).
//! - Idempotencia de transacciones vía la tabla `kv_transact_tokens`: el
//!   token se inserta con `ON CONFLICT DO NOTHING` dentro del mismo commit;
//!   si ya existía, la transacción es un no-op exitoso.

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{BigInt, Text};
use diesel::upsert::excluded;
use log::debug;
use serde_json::Value;

use parcel_core::store::{apply_update, eval_condition};
use parcel_core::{Condition, Item, ItemKey, KeyValueStore, QueryPage, QueryRequest, StoreError, TableId,
                  TransactItem, UpdateExpr};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{kv_items, kv_transact_tokens};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo se corre automáticamente el set de migraciones pendientes
/// (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simular en tests unitarios sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un
/// `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Error interno de transacción: separa fallas de condición (rollback
/// semántico) de errores Diesel reales.
#[derive(Debug)]
enum TxError {
    Diesel(diesel::result::Error),
    Condition(String),
    Validation(String),
}

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        TxError::Diesel(e)
    }
}

impl From<TxError> for StoreError {
    fn from(e: TxError) -> Self {
        match e {
            TxError::Diesel(err) => PersistenceError::from(err).into(),
            TxError::Condition(reason) => StoreError::ConditionFailed(reason),
            TxError::Validation(reason) => StoreError::Validation(reason),
        }
    }
}

/// Fila devuelta por las consultas de índice (sólo el JSONB completo).
#[derive(QueryableByName, Debug)]
struct AttrRow {
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    attributes: Value,
}

/// Implementación Postgres del `KeyValueStore`.
pub struct PgKeyValueStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgKeyValueStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

fn value_to_item(value: Value) -> Result<Item, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Fatal(format!("attributes is not an object: {other}"))),
    }
}

fn index_attr<'a>(item: &'a Item, attr: &str) -> Option<&'a str> {
    item.get(attr).and_then(Value::as_str)
}

/// Carga (con lock de fila) el ítem actual dentro de la transacción.
fn load_locked(tx: &mut PgConnection, table: TableId, pk: &str, sk: &str) -> Result<Option<Item>, TxError> {
    let attrs: Option<Value> = kv_items::table.find((table.as_str(), pk, sk))
                                              .select(kv_items::attributes)
                                              .for_update()
                                              .first(tx)
                                              .optional()?;
    match attrs {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(TxError::Validation(format!("attributes is not an object: {other}"))),
        None => Ok(None),
    }
}

/// Upsert de un ítem completo (fila + columnas de índice extraídas).
fn upsert_item(tx: &mut PgConnection, table: TableId, item: &Item) -> Result<(), TxError> {
    let pk = index_attr(item, "pk").ok_or_else(|| TxError::Validation("item lacks pk".to_string()))?;
    let sk = index_attr(item, "sk").ok_or_else(|| TxError::Validation("item lacks sk".to_string()))?;
    let attributes = Value::Object(item.clone());
    diesel::insert_into(kv_items::table)
        .values((kv_items::tbl.eq(table.as_str()),
                 kv_items::pk.eq(pk),
                 kv_items::sk.eq(sk),
                 kv_items::entity_type.eq(index_attr(item, "entityType")),
                 kv_items::gsi1pk.eq(index_attr(item, "gsi1pk")),
                 kv_items::gsi1sk.eq(index_attr(item, "gsi1sk")),
                 kv_items::gsi2pk.eq(index_attr(item, "gsi2pk")),
                 kv_items::gsi2sk.eq(index_attr(item, "gsi2sk")),
                 kv_items::gsi3pk.eq(index_attr(item, "gsi3pk")),
                 kv_items::gsi3sk.eq(index_attr(item, "gsi3sk")),
                 kv_items::attributes.eq(&attributes)))
        .on_conflict((kv_items::tbl, kv_items::pk, kv_items::sk))
        .do_update()
        .set((kv_items::entity_type.eq(excluded(kv_items::entity_type)),
              kv_items::gsi1pk.eq(excluded(kv_items::gsi1pk)),
              kv_items::gsi1sk.eq(excluded(kv_items::gsi1sk)),
              kv_items::gsi2pk.eq(excluded(kv_items::gsi2pk)),
              kv_items::gsi2sk.eq(excluded(kv_items::gsi2sk)),
              kv_items::gsi3pk.eq(excluded(kv_items::gsi3pk)),
              kv_items::gsi3sk.eq(excluded(kv_items::gsi3sk)),
              kv_items::attributes.eq(excluded(kv_items::attributes)),
              kv_items::updated_at.eq(diesel::dsl::now)))
        .execute(tx)?;
    Ok(())
}

fn delete_row(tx: &mut PgConnection, table: TableId, pk: &str, sk: &str) -> Result<(), TxError> {
    diesel::delete(kv_items::table.find((table.as_str(), pk, sk))).execute(tx)?;
    Ok(())
}

impl<P: ConnectionProvider> KeyValueStore for PgKeyValueStore<P> {
    fn get_item(&self, table: TableId, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        let attrs: Option<Value> = kv_items::table.find((table.as_str(), key.pk.as_str(), key.sk.as_str()))
                                                  .select(kv_items::attributes)
                                                  .first(&mut conn)
                                                  .optional()
                                                  .map_err(PersistenceError::from)?;
        attrs.map(value_to_item).transpose()
    }

    fn put_item(&self, table: TableId, item: Item, condition: Option<Condition>) -> Result<(), StoreError> {
        let pk = index_attr(&item, "pk").map(str::to_string);
        let sk = index_attr(&item, "sk").map(str::to_string);
        let (pk, sk) = match (pk, sk) {
            (Some(pk), Some(sk)) => (pk, sk),
            _ => return Err(StoreError::Validation("put_item requires string pk and sk attributes".to_string())),
        };
        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        conn.build_transaction()
            .read_write()
            .run(|tx| {
                let existing = load_locked(tx, table, &pk, &sk)?;
                if let Some(cond) = &condition {
                    eval_condition(existing.as_ref(), cond).map_err(TxError::Condition)?;
                }
                upsert_item(tx, table, &item)
            })
            .map_err(StoreError::from)
    }

    fn update_item(&self, table: TableId, key: &ItemKey, expr: UpdateExpr, condition: Option<Condition>)
                   -> Result<Item, StoreError> {
        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        conn.build_transaction()
            .read_write()
            .run(|tx| {
                let existing = load_locked(tx, table, &key.pk, &key.sk)?;
                if let Some(cond) = &condition {
                    eval_condition(existing.as_ref(), cond).map_err(TxError::Condition)?;
                }
                let updated = apply_update(existing, key, &expr).map_err(|e| TxError::Validation(e.to_string()))?;
                upsert_item(tx, table, &updated)?;
                Ok::<_, TxError>(updated)
            })
            .map_err(StoreError::from)
    }

    fn delete_item(&self, table: TableId, key: &ItemKey, condition: Option<Condition>) -> Result<(), StoreError> {
        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        conn.build_transaction()
            .read_write()
            .run(|tx| {
                let existing = load_locked(tx, table, &key.pk, &key.sk)?;
                if let Some(cond) = &condition {
                    eval_condition(existing.as_ref(), cond).map_err(TxError::Condition)?;
                }
                delete_row(tx, table, &key.pk, &key.sk)
            })
            .map_err(StoreError::from)
    }

    fn transact_write(&self, items: Vec<TransactItem>, client_request_token: Option<String>)
                      -> Result<(), StoreError> {
        // Mismo chequeo que el backend en memoria: dos operaciones sobre el
        // mismo ítem invalidan la transacción.
        for (i, a) in items.iter().enumerate() {
            for b in items.iter().skip(i + 1) {
                if a.target() == b.target() {
                    return Err(StoreError::Validation(format!("duplicate item in transaction: {:?}",
                                                              a.target())));
                }
            }
        }

        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        conn.build_transaction()
            .read_write()
            .run(|tx| {
                if let Some(token) = &client_request_token {
                    let inserted = diesel::insert_into(kv_transact_tokens::table)
                        .values(kv_transact_tokens::token.eq(token))
                        .on_conflict_do_nothing()
                        .execute(tx)?;
                    if inserted == 0 {
                        // Token ya aplicado: replay es no-op exitoso.
                        debug!("transact:token-replay token={token}");
                        return Ok::<_, TxError>(());
                    }
                }

                // Fase 1: condiciones bajo lock de fila.
                let mut snapshots: Vec<Option<Item>> = Vec::with_capacity(items.len());
                for op in &items {
                    let (table, pk, sk) = op.target();
                    let existing = load_locked(tx, table, pk, sk)?;
                    let condition = match op {
                        TransactItem::Put { condition, .. }
                        | TransactItem::Update { condition, .. }
                        | TransactItem::Delete { condition, .. } => condition.as_ref(),
                        TransactItem::ConditionCheck { condition, .. } => Some(condition),
                    };
                    if let Some(cond) = condition {
                        eval_condition(existing.as_ref(), cond).map_err(TxError::Condition)?;
                    }
                    snapshots.push(existing);
                }

                // Fase 2: aplicar.
                for (op, snapshot) in items.iter().zip(snapshots) {
                    match op {
                        TransactItem::Put { table, item, .. } => upsert_item(tx, *table, item)?,
                        TransactItem::Update { table, key, expr, .. } => {
                            let updated = apply_update(snapshot, key, expr)
                                .map_err(|e| TxError::Validation(e.to_string()))?;
                            upsert_item(tx, *table, &updated)?;
                        }
                        TransactItem::Delete { table, key, .. } => delete_row(tx, *table, &key.pk, &key.sk)?,
                        TransactItem::ConditionCheck { .. } => {}
                    }
                }
                Ok(())
            })
            .map_err(StoreError::from)
    }

    fn query(&self, request: &QueryRequest) -> Result<QueryPage, StoreError> {
        let pk_col = request.index.pk_attribute();
        let sk_col = request.index.sk_attribute();
        let comparator = if request.forward { ">" } else { "<" };
        let order = if request.forward { "ASC" } else { "DESC" };

        // Cursor: la misma tupla (sort, pk, sk) que usa el backend en
        // memoria, decodificada aquí hacia binds fijos.
        let (cursor_sort, cursor_pk, cursor_sk) = match &request.cursor {
            Some(cursor) => serde_json::from_str::<(String, String, String)>(cursor)
                .map_err(|e| StoreError::Validation(format!("bad cursor: {e}")))?,
            None => (String::new(), String::new(), String::new()),
        };

        let limit = request.limit.unwrap_or(usize::MAX);
        let fetch: i64 = request.limit.map(|l| l as i64 + 1).unwrap_or(i64::MAX);

        // Binds fijos: las cláusulas opcionales se desactivan con ''.
        let sql = format!(
            "SELECT attributes FROM kv_items \
             WHERE tbl = $1 AND {pk_col} = $2 AND {sk_col} IS NOT NULL \
               AND ($3 = '' OR left({sk_col}, length($3)) = $3) \
               AND ($4 = '' OR entity_type = $4) \
               AND ($5 = '' OR ({sk_col}, pk, sk) {comparator} ($5, $6, $7)) \
             ORDER BY {sk_col} {order}, pk {order}, sk {order} \
             LIMIT $8"
        );
        let mut conn = self.provider.connection().map_err(StoreError::from)?;
        let rows: Vec<AttrRow> = diesel::sql_query(sql)
            .bind::<Text, _>(request.table.as_str())
            .bind::<Text, _>(&request.partition)
            .bind::<Text, _>(request.sk_prefix.clone().unwrap_or_default())
            .bind::<Text, _>(request.entity_type.clone().unwrap_or_default())
            .bind::<Text, _>(&cursor_sort)
            .bind::<Text, _>(&cursor_pk)
            .bind::<Text, _>(&cursor_sk)
            .bind::<BigInt, _>(fetch)
            .load(&mut conn)
            .map_err(PersistenceError::from)?;

        let truncated = rows.len() > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit));
        for row in rows.into_iter().take(limit) {
            items.push(value_to_item(row.attributes)?);
        }
        let cursor = if truncated {
            items.last()
                 .map(|item| {
                     let sort = index_attr(item, sk_col).unwrap_or_default();
                     let pk = index_attr(item, "pk").unwrap_or_default();
                     let sk = index_attr(item, "sk").unwrap_or_default();
                     serde_json::to_string(&(sort, pk, sk))
                         .map_err(|e| StoreError::Fatal(format!("cursor encode: {e}")))
                 })
                 .transpose()?
        } else {
            None
        };
        Ok(QueryPage { items, cursor })
    }

    fn batch_get(&self, table: TableId, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.get_item(table, key)? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// Comportamiento:
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min = max`).
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
/// - Devuelve `PersistenceError::TransientIo` ante errores del pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    // Ejecutar migraciones una sola vez al construir.
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
