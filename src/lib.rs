//! ParcelFlow Rust Library
//!
//! Este crate actúa como la fachada del workspace:
//! - Expone `config` para la configuración del proceso (env + .env).
//! - Re-exporta los tipos de uso diario del pipeline para que binarios y
//!   clientes externos no tengan que conocer crate por crate.
//!
//! Puede usarse desde `main.rs` o por otros crates/clientes.

pub mod config;
pub mod entry;

pub use parcel_core::{EventPipeline, ExecutionSelector, InMemoryKeyValueStore, IngestEngine, PipelineReport,
                      SortOrder, StateEngine, StatusMutator};
pub use parcel_domain::{classify, fingerprint, Bucket, ErrorStatus, ExecutionStatus, WorkflowEvent};
pub use parcel_metrics::{InMemoryMetricsSink, LogMetricsSink, MetricsSink};
pub use parcel_repair::{Collaborators, RepairConfig, RepairController, RepairOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facade_reexports_the_daily_vocabulary() {
        // La clasificación y el fingerprint quedan accesibles sin conocer
        // los crates internos.
        assert_eq!(classify("Rate exceeded"), "10002");
        let fp = fingerprint("m", "p", "c");
        assert_eq!(fp.as_str().len(), 64);
    }
}
