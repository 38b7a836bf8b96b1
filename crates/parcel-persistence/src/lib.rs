//! parcel-persistence
//!
//! Implementación Postgres (Diesel) del `KeyValueStore` del core con paridad
//! 1:1 frente al backend en memoria: mismas condiciones, mismos errores,
//! misma idempotencia de tokens. La tabla única `kv_items` materializa los
//! índices secundarios como columnas extraídas con índices B-tree parciales;
//! el ítem completo vive en `attributes` (JSONB).
//!
//! Módulos:
//! - `pg`: el store Postgres (transacciones, tokens, consultas paginadas).
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.
//! - `error`: mapeo Diesel → taxonomía de errores del repositorio.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgKeyValueStore, PgPool, PoolProvider};
