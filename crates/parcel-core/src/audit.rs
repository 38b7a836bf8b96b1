//! Auditor de invariantes contables sobre el store en memoria.
//!
//! Recorre un snapshot completo y verifica los invariantes del modelo de
//! datos:
//! - conteo total de cada registro de error vs. la suma de sus links,
//! - conteos unique/total/open de cada ejecución vs. sus links,
//! - ejecuciones con cero errores abiertos (deberían haberse borrado),
//! - links huérfanos (sin registro de error),
//! - sort keys GSI re-derivables de los atributos base,
//! - balance de agregados vs. estados por (county, dg, bucket).
//!
//! Es una herramienta de diagnóstico para tests y el binario de
//! inspección; el backend durable se audita restaurando su contenido a un
//! store en memoria.

use std::collections::HashMap;

use serde_json::Value;

use parcel_domain::ErrorStatus;

use crate::constants::{ENTITY_ERROR_RECORD, ENTITY_EXECUTION_ERROR_LINK, ENTITY_FAILED_EXECUTION,
                       ENTITY_STEP_AGGREGATE};
use crate::errors::EngineError;
use crate::model::{ErrorRecord, ExecutionErrorLink, FailedExecution, StepAggregate};
use crate::store::{InMemoryKeyValueStore, Item, TableId};

/// Resultado de una auditoría; vacío de violaciones = estado sano.
#[derive(Debug, Default)]
pub struct AuditReport {
    pub executions: usize,
    pub records: usize,
    pub links: usize,
    pub aggregate_cells: usize,
    pub violations: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audita las entidades de la tabla de tracking y el balance contra la
/// tabla de estados.
pub fn audit(store: &InMemoryKeyValueStore) -> Result<AuditReport, EngineError> {
    let mut report = AuditReport::default();

    let mut executions: Vec<FailedExecution> = Vec::new();
    let mut records: HashMap<String, ErrorRecord> = HashMap::new();
    let mut links: Vec<ExecutionErrorLink> = Vec::new();
    let mut aggregates: Vec<StepAggregate> = Vec::new();
    let mut raw_by_key: HashMap<(String, String), Item> = HashMap::new();

    for item in store.dump(TableId::Tracking) {
        let pk = item.get("pk").and_then(Value::as_str).unwrap_or_default().to_string();
        let sk = item.get("sk").and_then(Value::as_str).unwrap_or_default().to_string();
        raw_by_key.insert((pk, sk), item.clone());
        match item.get("entityType").and_then(Value::as_str) {
            Some(ENTITY_FAILED_EXECUTION) => executions.push(FailedExecution::from_item(&item)?),
            Some(ENTITY_ERROR_RECORD) => {
                let record = ErrorRecord::from_item(&item)?;
                records.insert(record.error_code.clone(), record);
            }
            Some(ENTITY_EXECUTION_ERROR_LINK) => links.push(ExecutionErrorLink::from_item(&item)?),
            Some(ENTITY_STEP_AGGREGATE) => aggregates.push(StepAggregate::from_item(&item)?),
            _ => report.violations.push(format!("item without entityType: {:?}",
                                                item.get("pk").and_then(Value::as_str))),
        }
    }
    report.executions = executions.len();
    report.records = records.len();
    report.links = links.len();
    report.aggregate_cells = aggregates.len();

    // Registro ↔ links: total monotónico y sin huérfanos.
    let mut link_sum_per_code: HashMap<&str, u64> = HashMap::new();
    for link in &links {
        *link_sum_per_code.entry(link.error_code.as_str()).or_default() += link.occurrences;
        if !records.contains_key(&link.error_code) {
            report.violations.push(format!("link {}/{} has no error record", link.execution_id, link.error_code));
        }
    }
    for (code, record) in &records {
        let linked = link_sum_per_code.get(code.as_str()).copied().unwrap_or(0);
        // El total del registro es monotónico y sobrevive a links borrados:
        // nunca puede quedar por DEBAJO de lo que los links suman.
        if record.total_count < linked {
            report.violations.push(format!("record {code}: totalCount {} < linked occurrences {linked}",
                                           record.total_count));
        }
    }

    // Ejecución ↔ links.
    for exec in &executions {
        let own: Vec<&ExecutionErrorLink> = links.iter().filter(|l| l.execution_id == exec.execution_id).collect();
        let open = own.iter().filter(|l| l.status == ErrorStatus::Failed).count() as u64;
        let total: u64 = own.iter().map(|l| l.occurrences).sum();
        if exec.unique_error_count != own.len() as u64 {
            report.violations.push(format!("execution {}: uniqueErrorCount {} != {} links",
                                           exec.execution_id,
                                           exec.unique_error_count,
                                           own.len()));
        }
        if exec.total_occurrences != total {
            report.violations.push(format!("execution {}: totalOccurrences {} != sum {}",
                                           exec.execution_id,
                                           exec.total_occurrences,
                                           total));
        }
        if exec.open_error_count != open {
            report.violations.push(format!("execution {}: openErrorCount {} != {} open links",
                                           exec.execution_id,
                                           exec.open_error_count,
                                           open));
        }
        if exec.open_error_count == 0 {
            report.violations.push(format!("execution {} still present with zero open errors",
                                           exec.execution_id));
        }
    }

    // Sort keys GSI re-derivables de los atributos base.
    for exec in &executions {
        check_derived_keys(&mut report, &raw_by_key, &exec.key(), &exec.to_item()?,
                           &["gsi1pk", "gsi1sk", "gsi3pk", "gsi3sk"],
                           &format!("execution {}", exec.execution_id));
    }
    for record in records.values() {
        check_derived_keys(&mut report, &raw_by_key, &record.key(), &record.to_item()?,
                           &["gsi1pk", "gsi1sk", "gsi2pk", "gsi2sk", "gsi3pk", "gsi3sk"],
                           &format!("record {}", record.error_code));
    }

    // Agregados sin contadores negativos.
    for cell in &aggregates {
        for (attr, count) in [("inProgressCount", cell.in_progress_count),
                              ("failedCount", cell.failed_count),
                              ("succeededCount", cell.succeeded_count)] {
            if count < 0 {
                report.violations.push(format!("aggregate {}/{} {}/{}: {attr} is negative ({count})",
                                               cell.county,
                                               cell.data_group_label,
                                               cell.phase,
                                               cell.step));
            }
        }
    }

    // Balance agregados ↔ estados por (county, dg, bucket).
    let mut from_states: HashMap<(String, String, String), i64> = HashMap::new();
    for item in store.dump(TableId::State) {
        let county = item.get("county").and_then(Value::as_str).unwrap_or_default().to_string();
        let dg = item.get("dataGroupLabel").and_then(Value::as_str).unwrap_or_default().to_string();
        let bucket = item.get("bucket").and_then(Value::as_str).unwrap_or_default().to_string();
        *from_states.entry((county, dg, bucket)).or_default() += 1;
    }
    let mut from_cells: HashMap<(String, String, String), i64> = HashMap::new();
    for cell in &aggregates {
        for (bucket, count) in [("IN_PROGRESS", cell.in_progress_count), ("FAILED", cell.failed_count),
                                ("SUCCEEDED", cell.succeeded_count)] {
            if count != 0 {
                *from_cells.entry((cell.county.clone(), cell.data_group_label.clone(), bucket.to_string()))
                           .or_default() += count;
            }
        }
    }
    if from_states != from_cells {
        report.violations.push(format!("aggregate balance mismatch: states {from_states:?} vs cells {from_cells:?}"));
    }

    Ok(report)
}

/// Compara las claves GSI almacenadas contra las re-derivadas por la
/// entidad.
fn check_derived_keys(report: &mut AuditReport, raw_by_key: &HashMap<(String, String), Item>,
                      key: &crate::store::ItemKey, derived: &Item, attrs: &[&str], label: &str) {
    let Some(stored) = raw_by_key.get(&(key.pk.clone(), key.sk.clone())) else {
        return;
    };
    for attr in attrs {
        if stored.get(*attr) != derived.get(*attr) {
            report.violations.push(format!("{label}: stored {attr} {:?} != derived {:?}",
                                           stored.get(*attr),
                                           derived.get(*attr)));
        }
    }
}
