//! Constantes del núcleo.
//!
//! Los literales de partición de los GSI y el ancho de padding numérico son
//! contrato de datos: cambiarlos invalida todas las sort keys ya escritas.

/// Ancho exacto del padding decimal en sort keys numéricas.
pub const PAD_WIDTH: usize = 10;

/// Límite de ítems por transacción de la plataforma; las transacciones más
/// grandes se trocean automáticamente.
pub const TRANSACT_MAX_ITEMS: usize = 100;

/// Partición GSI1/GSI3 de las ejecuciones fallidas ordenadas por conteo.
pub const METRIC_ERRORCOUNT: &str = "METRIC#ERRORCOUNT";

/// Partición GSI3 de los registros de error ordenados por conteo total.
pub const METRIC_ERRORCOUNT_ERROR: &str = "METRIC#ERRORCOUNT#ERROR";

/// Partición GSI1/GSI2 del catálogo de registros de error.
pub const TYPE_ERROR: &str = "TYPE#ERROR";

/// Tokens de `entityType` (filtros de índice).
pub const ENTITY_FAILED_EXECUTION: &str = "FailedExecution";
pub const ENTITY_ERROR_RECORD: &str = "ErrorRecord";
pub const ENTITY_EXECUTION_ERROR_LINK: &str = "ExecutionErrorLink";
pub const ENTITY_EXECUTION_STATE: &str = "ExecutionState";
pub const ENTITY_STEP_AGGREGATE: &str = "StepAggregate";
