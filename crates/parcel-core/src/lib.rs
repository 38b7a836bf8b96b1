//! parcel-core: núcleo de rastreo de errores y estado del pipeline.
//!
//! Propósito:
//! - Proveer el repositorio clave-valor neutral (tabla única + 3 índices
//!   secundarios) y los cuatro motores que escriben/leen sobre él.
//! - Garantizar los invariantes contables (conteos de errores, balances de
//!   agregados) bajo incrementos atómicos, tokens de idempotencia y
//!   concurrencia optimista.
//!
//! Componentes principales:
//! - `store`: trait `KeyValueStore` (get/update/transact/query/batch) +
//!   implementación en memoria con paridad de semántica frente al backend
//!   durable, taxonomía de errores y retry con backoff.
//! - `keys`: codificación de sort keys compuestas (`pad10`, literales de
//!   partición de los GSI).
//! - `model`: las cinco entidades persistidas y la derivación de sus claves.
//! - `ingest`: motor de ingesta de errores.
//! - `state`: motor de estado y agregados por paso.
//! - `mutate`: mutador de estatus en bloque y borrado de ejecuciones.
//! - `select`: selector de ejecuciones peor/mejor.
//! - `pipeline`: puerta de entrada que encadena ingesta + estado + métrica.

pub mod audit;
pub mod constants;
pub mod errors;
pub mod ingest;
pub mod keys;
pub mod model;
pub mod mutate;
pub mod pipeline;
pub mod select;
pub mod state;
pub mod store;

// Re-exports públicos principales
pub use audit::{audit, AuditReport};
pub use errors::EngineError;
pub use ingest::{IngestEngine, IngestOutcome};
pub use model::{ErrorRecord, ExecutionErrorLink, ExecutionState, FailedExecution, StepAggregate};
pub use mutate::{MutationReport, StatusMutator};
pub use pipeline::{EventPipeline, PipelineReport};
pub use select::{ExecutionSelector, SelectedExecution, SortOrder};
pub use state::{StateEngine, StateOutcome};
pub use store::{apply_update, eval_condition, Condition, InMemoryKeyValueStore, IndexId, Item, ItemKey,
                KeyValueStore, QueryPage, QueryRequest, RetryPolicy, StoreError, TableId, TransactItem,
                UpdateAction, UpdateExpr};
