//! parcel-metrics: publicación de métricas de fase.
//!
//! Rol en el flujo:
//! - Cada evento de workflow emite exactamente una muestra de contador hacia
//!   el sink externo; el loop de auto-reparación emite contadores por
//!   transición terminal (éxito, falla, errores corregidos).
//! - La construcción de la muestra es una función pura del evento; el sink es
//!   un colaborador externo detrás de un trait.
//!
//! Contrato:
//! - Namespace fijo `Elephant/Workflow`; nombre `${phase}ElephantPhase`;
//!   unidad Count; valor 1; dimensiones `{County, Status, Step}`.
//! - Una falla de publicación DEBE propagarse: perder visibilidad se trata
//!   como bug de datos, no como inconveniente.

pub mod sample;
pub mod sink;

pub use sample::{counter_sample, phase_sample, MetricSample, NAMESPACE, UNIT_COUNT};
pub use sink::{InMemoryMetricsSink, LogMetricsSink, MetricsError, MetricsSink};
