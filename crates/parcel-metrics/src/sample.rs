//! Muestras de métrica y su derivación desde eventos.

use serde::{Deserialize, Serialize};

use parcel_domain::WorkflowEvent;

/// Namespace único de todo el pipeline.
pub const NAMESPACE: &str = "Elephant/Workflow";

/// Unidad de los contadores.
pub const UNIT_COUNT: &str = "Count";

/// Una muestra puntual lista para publicar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub namespace: String,
    pub name: String,
    pub unit: String,
    pub value: f64,
    /// Pares (dimensión, valor) en orden estable.
    pub dimensions: Vec<(String, String)>,
}

/// Muestra de fase para un evento: función pura, una por evento.
pub fn phase_sample(event: &WorkflowEvent) -> MetricSample {
    MetricSample { namespace: NAMESPACE.to_string(),
                   name: format!("{}ElephantPhase", event.phase),
                   unit: UNIT_COUNT.to_string(),
                   value: 1.0,
                   dimensions: vec![("County".to_string(), event.county.clone()),
                                    ("Status".to_string(), event.status.as_str().to_string()),
                                    ("Step".to_string(), event.step.clone())] }
}

/// Contador genérico para las transiciones terminales del loop de
/// reparación (éxito/falla/errores corregidos).
pub fn counter_sample(name: &str, value: f64, dimensions: Vec<(String, String)>) -> MetricSample {
    MetricSample { namespace: NAMESPACE.to_string(),
                   name: name.to_string(),
                   unit: UNIT_COUNT.to_string(),
                   value,
                   dimensions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_domain::ExecutionStatus;

    #[test]
    fn phase_sample_is_pure_and_exact() {
        let ev: WorkflowEvent = serde_json::from_value(serde_json::json!({
            "executionId": "E1",
            "county": "palmbeach",
            "phase": "prepare",
            "step": "download",
            "status": "RUNNING"
        }))
        .expect("parse");
        let s = phase_sample(&ev);
        assert_eq!(s.namespace, "Elephant/Workflow");
        assert_eq!(s.name, "prepareElephantPhase");
        assert_eq!(s.unit, "Count");
        assert_eq!(s.value, 1.0);
        assert_eq!(s.dimensions,
                   vec![("County".to_string(), "palmbeach".to_string()),
                        ("Status".to_string(), ExecutionStatus::Running.as_str().to_string()),
                        ("Step".to_string(), "download".to_string())]);
    }
}
