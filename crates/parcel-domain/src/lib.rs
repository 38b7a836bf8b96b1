//! parcel-domain: vocabulario del pipeline de ingesta de datos de parcelas.
//!
//! Propósito:
//! - Definir los tipos neutrales que comparten todos los motores: eventos de
//!   workflow, estatus de ejecución, buckets normalizados y estatus de ciclo
//!   de vida de errores.
//! - Proveer las dos funciones puras de identificación de errores:
//!   fingerprint (SHA-256 estable entre ejecuciones) y clasificación
//!   (tabla ordenada de reglas regex → código numérico).
//!
//! Componentes principales:
//! - `event`: `WorkflowEvent` entrante, estatus crudos y su normalización a
//!   tres buckets.
//! - `codes`: tipo de error (`errorType`), tabla de clasificación ordenada y
//!   código centinela.
//! - `fingerprint`: hash SHA-256 en hex minúsculas de `message#path#county`.
//! - `error`: errores semánticos del dominio.

pub mod codes;
pub mod error;
pub mod event;
pub mod fingerprint;

// Re-exports públicos principales
pub use codes::{classify, error_type, rule_table, ClassificationRule, DEFAULT_ERROR_CODE};
pub use error::DomainError;
pub use event::{Bucket, ErrorStatus, ExecutionStatus, SourceRef, WorkflowError, WorkflowEvent};
pub use fingerprint::{fingerprint, Fingerprint};
