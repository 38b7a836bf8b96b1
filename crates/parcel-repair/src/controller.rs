//! Controller de auto-reparación: la máquina de estados del intento.
//!
//! ```text
//!  PICK_EXECUTION ─► DOWNLOAD_INPUTS ─► DOWNLOAD_SCRIPTS ─► PARSE_ERRORS ─►
//!  INVOKE_AGENT ─► UPLOAD_PATCHED ─► VALIDATE ─┬─► COMMIT ─► MARK_SOLVED ─► DELETE_EXEC
//!                                              └─► ROLLBACK ─► RETRY (≤ max)
//!  EXHAUSTED ─► MARK_UNRECOVERABLE ─► SEND_DLQ (sólo SVL) ─► DELETE_EXEC
//! ```
//!
//! Decisiones:
//! - El commit exige `status == success` Y transaction items no vacíos;
//!   cualquier otra respuesta cuenta como rechazo y dispara rollback.
//! - El rollback re-sube el archive original (respaldado antes del primer
//!   parche) a la ubicación de scripts.
//! - Si el validador emitió un nuevo CSV de errores y quedan intentos, la
//!   siguiente iteración lo usa como fuente (targets frescos para el
//!   agente). La URI viaja tipada; el regex es fallback para mensajes
//!   crudos.
//! - Un intento es secuencial; varios controllers concurrentes atacan
//!   ejecuciones distintas: la fila elegida se borra sólo en transiciones
//!   terminales, así no puede reseleccionarse en el siguiente tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::time::timeout;

use parcel_core::{ExecutionSelector, FailedExecution, KeyValueStore, SortOrder, StatusMutator};
use parcel_domain::DEFAULT_ERROR_CODE;
use parcel_metrics::{counter_sample, MetricSample, MetricsSink};

use crate::callback::{failure_error, success_payload, truncated_cause};
use crate::collab::{AgentRequest, BlobStore, CostObserver, MessageQueue, RepairAgent, ScriptValidator,
                    ValidationReport, WorkflowCallback};
use crate::csvdata::{parse_errors_csv, Scenario};
use crate::error::RepairError;
use crate::prompt::PromptTemplate;
use crate::uri::ObjectUri;
use crate::workdir::TempWorkdir;

/// Plazos de las llamadas externas (cancelación cooperativa).
const BLOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const AGENT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const VALIDATOR_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const MESSAGING_TIMEOUT: Duration = Duration::from_secs(30);

/// Acota una llamada externa a su plazo; el vencimiento se clasifica como
/// falla del intento (el loop decide si reintenta).
async fn bounded<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T, RepairError>
    where F: Future<Output = Result<T, RepairError>>
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RepairError::Timeout { operation, seconds: limit.as_secs() }),
    }
}

/// Parámetros del loop.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    pub max_attempts: u32,
    /// Bucket donde viven los archives de scripts por condado.
    pub scripts_bucket: String,
    /// Prefijo del layout `<transformPrefix>/<countyLowercase>.zip`.
    pub transform_prefix: String,
    /// Filtro opcional de tipo de error al seleccionar la ejecución.
    pub error_type_filter: Option<String>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { max_attempts: 3,
               scripts_bucket: "parcel-scripts".to_string(),
               transform_prefix: "transform-scripts".to_string(),
               error_type_filter: None }
    }
}

/// Colaboradores externos inyectados (sin estado ambiente).
pub struct Collaborators {
    pub blob: Arc<dyn BlobStore>,
    pub agent: Arc<dyn RepairAgent>,
    pub validator: Arc<dyn ScriptValidator>,
    pub output_queue: Arc<dyn MessageQueue>,
    pub dlq: Arc<dyn MessageQueue>,
    pub callback: Arc<dyn WorkflowCallback>,
    pub metrics: Arc<dyn MetricsSink>,
    pub cost_observer: Arc<dyn CostObserver>,
}

/// Transición terminal de una invocación del controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// No hay ejecuciones fallidas que atacar.
    NoWork,
    Repaired {
        execution_id: String,
        fixed_errors: usize,
        attempts: u32,
    },
    Exhausted {
        execution_id: String,
        attempts: u32,
    },
}

pub struct RepairController<S: KeyValueStore + Clone> {
    selector: ExecutionSelector<S>,
    mutator: StatusMutator<S>,
    collab: Collaborators,
    prompt: PromptTemplate,
    config: RepairConfig,
}

impl<S: KeyValueStore + Clone> RepairController<S> {
    pub fn new(store: S, collab: Collaborators, config: RepairConfig) -> Self {
        Self { selector: ExecutionSelector::new(store.clone()),
               mutator: StatusMutator::new(store),
               collab,
               prompt: PromptTemplate::repair_default(),
               config }
    }

    /// Una invocación completa: elegir, intentar hasta `max_attempts`,
    /// confirmar o declarar irrecuperable.
    pub async fn run_once(&self) -> Result<RepairOutcome, RepairError> {
        // PICK_EXECUTION: atacar la peor ejecución primero.
        let Some(selected) = self.selector
                                 .execution_with(SortOrder::Most, self.config.error_type_filter.as_deref())?
        else {
            return Ok(RepairOutcome::NoWork);
        };
        let execution = selected.execution;
        let county_path = execution.county.to_lowercase();
        let prepared_uri = execution.prepared_s3_uri
                                    .clone()
                                    .ok_or_else(|| RepairError::Validation(format!("execution {} lacks preparedS3Uri",
                                                                                   execution.execution_id)))?;
        let mut errors_uri = execution.errors_s3_uri
                                      .clone()
                                      .ok_or_else(|| RepairError::Validation(format!("execution {} lacks errorsS3Uri",
                                                                                     execution.execution_id)))?;
        let scenario = Scenario::from_errors_uri(&errors_uri);
        let scripts_uri = ObjectUri::new(self.config.scripts_bucket.clone(),
                                         format!("{}/{}.zip", self.config.transform_prefix, county_path));

        // Respaldo del archive original: el rollback lo restaura tal cual.
        let original_scripts = bounded("download scripts backup", BLOB_TIMEOUT,
                                       self.collab.blob.get(&scripts_uri)).await?;

        let mut attempt: u32 = 0;
        while attempt < self.config.max_attempts {
            attempt += 1;
            info!("repair:attempt execution_id={} attempt={} scenario={} errors_uri={}",
                  execution.execution_id,
                  attempt,
                  scenario.as_str(),
                  errors_uri);
            match self.attempt_once(&execution, &prepared_uri, &errors_uri, &scripts_uri, attempt).await {
                Ok((report, hashes)) if report.status == "success" && !report.transaction_items.is_empty() => {
                    return self.commit(&execution, scenario, report, hashes, &prepared_uri, attempt).await;
                }
                Ok((report, _)) => {
                    warn!("repair:not-committable execution_id={} status={} items={}",
                          execution.execution_id,
                          report.status,
                          report.transaction_items.len());
                    self.rollback(&scripts_uri, &original_scripts).await?;
                }
                Err(err) => {
                    self.rollback(&scripts_uri, &original_scripts).await?;
                    if let Some(next_uri) = extract_new_errors_uri(&err) {
                        if attempt < self.config.max_attempts {
                            info!("repair:fresh-targets execution_id={} next_errors_uri={}",
                                  execution.execution_id,
                                  next_uri);
                            errors_uri = next_uri;
                        }
                    }
                    warn!("repair:attempt-failed execution_id={} attempt={} err={err}",
                          execution.execution_id,
                          attempt);
                }
            }
        }

        self.exhaust(&execution, scenario, attempt).await
    }

    /// Un intento: descargar insumos y scripts, parsear errores, invocar al
    /// agente, subir el parche y validar. El workdir temporal se limpia en
    /// el Drop, cubra el camino que cubra el intento.
    async fn attempt_once(&self, execution: &FailedExecution, prepared_uri: &str, errors_uri: &str,
                          scripts_uri: &ObjectUri, attempt: u32)
                          -> Result<(ValidationReport, Vec<String>), RepairError> {
        let workdir = TempWorkdir::create(&format!("{}-{attempt}", execution.execution_id))?;

        // DOWNLOAD_INPUTS
        let prepared_obj = ObjectUri::parse(prepared_uri)?;
        let prepared = bounded("download prepared inputs", BLOB_TIMEOUT, self.collab.blob.get(&prepared_obj)).await?;
        workdir.write("output.zip", &prepared)?;

        // DOWNLOAD_SCRIPTS
        let scripts = bounded("download scripts", BLOB_TIMEOUT, self.collab.blob.get(scripts_uri)).await?;
        workdir.write("scripts.zip", &scripts)?;

        // PARSE_ERRORS
        let errors_obj = ObjectUri::parse(errors_uri)?;
        let csv_bytes = bounded("download errors csv", BLOB_TIMEOUT, self.collab.blob.get(&errors_obj)).await?;
        let parsed = parse_errors_csv(&csv_bytes)?;
        if parsed.is_empty() {
            return Err(RepairError::Csv(format!("no error rows in {errors_uri}")));
        }
        let hashes: Vec<String> = parsed.iter()
                                        .map(|e| e.fingerprint(&execution.county).to_string())
                                        .collect();

        // INVOKE_AGENT
        let error_table: String = parsed.iter()
                                        .map(|e| {
                                            format!("| {} | {} | {} |",
                                                    e.message,
                                                    e.path,
                                                    e.current_value.as_deref().unwrap_or("-"))
                                        })
                                        .collect::<Vec<_>>()
                                        .join("\n");
        let prompt = self.prompt.render(&[("county", execution.county.clone()),
                                          ("error_count", parsed.len().to_string()),
                                          ("error_table", error_table)])?;
        let request = AgentRequest { county: execution.county.clone(),
                                     scripts_archive: scripts,
                                     errors: parsed,
                                     prompt };
        let patch = bounded("agent rewrite", AGENT_TIMEOUT, self.collab.agent.rewrite_scripts(request)).await?;
        if let Some(cost) = &patch.cost {
            self.collab.cost_observer.record(&execution.county, cost);
        }

        // UPLOAD_PATCHED
        bounded("upload patched scripts", BLOB_TIMEOUT,
                self.collab.blob.put(scripts_uri, patch.patched_archive)).await?;

        // VALIDATE
        let payload = validation_payload(prepared_uri, execution)?;
        let report = bounded("validator", VALIDATOR_TIMEOUT, self.collab.validator.validate(payload)).await?;
        Ok((report, hashes))
    }

    /// Restaura el archive original en la ubicación de scripts.
    async fn rollback(&self, scripts_uri: &ObjectUri, original: &[u8]) -> Result<(), RepairError> {
        bounded("rollback scripts", BLOB_TIMEOUT, self.collab.blob.put(scripts_uri, original.to_vec())).await
    }

    async fn commit(&self, execution: &FailedExecution, scenario: Scenario, report: ValidationReport,
                    hashes: Vec<String>, prepared_uri: &str, attempts: u32)
                    -> Result<RepairOutcome, RepairError> {
        // SVL manda los transaction items a la cola de salida; MVL no.
        if scenario == Scenario::Svl {
            let message = json!({
                "county": execution.county,
                "transactionItems": report.transaction_items,
            });
            bounded("output queue send", MESSAGING_TIMEOUT, self.collab.output_queue.send(message)).await?;
        }
        // MARK_SOLVED: propaga a todas las ejecuciones que comparten hash.
        self.mutator.mark_solved_for_hashes(&hashes, &execution.county)?;
        // DELETE_EXEC (no-op si el mutador ya la borró al llegar a cero).
        self.mutator.delete_execution(&execution.execution_id)?;
        if let Some(task_token) = &execution.task_token {
            let payload = success_payload(prepared_uri, &execution.county, task_token);
            bounded("workflow callback", MESSAGING_TIMEOUT,
                    self.collab.callback.send_success(task_token, payload)).await?;
        }
        let dims = metric_dims(&execution.county, scenario);
        self.publish(counter_sample("AutoRepairSuccess", 1.0, dims.clone()))?;
        self.publish(counter_sample("AutoRepairFixedErrors", hashes.len() as f64, dims))?;
        info!("repair:committed execution_id={} fixed={} attempts={}",
              execution.execution_id,
              hashes.len(),
              attempts);
        Ok(RepairOutcome::Repaired { execution_id: execution.execution_id.clone(),
                                     fixed_errors: hashes.len(),
                                     attempts })
    }

    async fn exhaust(&self, execution: &FailedExecution, scenario: Scenario, attempts: u32)
                     -> Result<RepairOutcome, RepairError> {
        // El código representativo se captura ANTES de que la propagación
        // borre la ejecución y sus links.
        let representative_code = self.mutator
                                      .links_of(&execution.execution_id)?
                                      .first()
                                      .map(|link| link.error_code.clone())
                                      .unwrap_or_else(|| DEFAULT_ERROR_CODE.to_string());

        // MARK_UNRECOVERABLE propaga a las demás ejecuciones con estos
        // códigos; la propia ejecución llega a cero y se borra.
        self.mutator.mark_unrecoverable_for_execution(&execution.execution_id)?;

        // SEND_DLQ: sólo SVL y sólo con fuente conocida.
        if scenario.routes_to_dlq() {
            match &execution.source {
                Some(source) => {
                    let message = json!({
                        "bucket": source.bucket,
                        "key": source.key,
                        "executionId": execution.execution_id,
                    });
                    bounded("dlq send", MESSAGING_TIMEOUT, self.collab.dlq.send(message)).await?;
                }
                None => warn!("repair:dlq-skip execution_id={} source missing", execution.execution_id),
            }
        }

        // DELETE_EXEC explícito; normalmente ya es no-op.
        self.mutator.delete_execution(&execution.execution_id)?;

        if let Some(task_token) = &execution.task_token {
            let cause = truncated_cause(&json!({
                "executionId": execution.execution_id,
                "county": execution.county,
                "attempts": attempts,
                "scenario": scenario.as_str(),
            }));
            let error = failure_error(&representative_code, &execution.county);
            bounded("workflow callback", MESSAGING_TIMEOUT,
                    self.collab.callback.send_failure(task_token, &error, &cause)).await?;
        }
        self.publish(counter_sample("AutoRepairFailure", 1.0, metric_dims(&execution.county, scenario)))?;
        warn!("repair:exhausted execution_id={} attempts={}", execution.execution_id, attempts);
        Ok(RepairOutcome::Exhausted { execution_id: execution.execution_id.clone(), attempts })
    }

    /// La publicación de métricas se reintenta UNA vez; si vuelve a fallar,
    /// se propaga (perder visibilidad es bug, no inconveniente).
    fn publish(&self, sample: MetricSample) -> Result<(), RepairError> {
        if let Err(first) = self.collab.metrics.publish(&sample) {
            warn!("metric publish failed once, retrying: {first}");
            self.collab.metrics.publish(&sample)?;
        }
        Ok(())
    }
}

fn metric_dims(county: &str, scenario: Scenario) -> Vec<(String, String)> {
    vec![("County".to_string(), county.to_string()),
         ("Scenario".to_string(), scenario.as_str().to_string())]
}

/// Payload del post-procesador de validación.
fn validation_payload(prepared_uri: &str, execution: &FailedExecution) -> Result<Value, RepairError> {
    let prepared = ObjectUri::parse(prepared_uri)?;
    let seed_uri = prepared.sibling("seed_output.zip");
    let mut payload = json!({
        "prepare": {"output_s3_uri": prepared_uri},
        "seed_output_s3_uri": seed_uri.to_string(),
        "prepareSkipped": false,
        "saveErrorsOnValidationFailure": false,
    });
    if let Some(source) = &execution.source {
        payload["s3"] = json!({"bucket": {"name": source.bucket}, "object": {"key": source.key}});
    }
    Ok(payload)
}

static ERRORS_CSV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Submit errors csv:\s*(s3://[^ ]+)").expect("errors csv regex"));

/// URI del nuevo CSV de errores: campo tipado primero, regex como fallback
/// para mensajes crudos emitidos por el validador.
fn extract_new_errors_uri(err: &RepairError) -> Option<String> {
    match err {
        RepairError::ValidatorRejected { new_errors_uri: Some(uri), .. } => Some(uri.clone()),
        RepairError::ValidatorRejected { message, new_errors_uri: None } => {
            ERRORS_CSV_RE.captures(message).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_errors_uri_prefers_the_typed_field() {
        let typed = RepairError::ValidatorRejected { message: "Submit errors csv: s3://b/ignored.csv".to_string(),
                                                     new_errors_uri: Some("s3://b/typed.csv".to_string()) };
        assert_eq!(extract_new_errors_uri(&typed).as_deref(), Some("s3://b/typed.csv"));

        let raw = RepairError::ValidatorRejected { message: "validator blew up. Submit errors csv: s3://b/k2.csv"
                                                                .to_string(),
                                                   new_errors_uri: None };
        assert_eq!(extract_new_errors_uri(&raw).as_deref(), Some("s3://b/k2.csv"));

        let unrelated = RepairError::Validation("nope".to_string());
        assert_eq!(extract_new_errors_uri(&unrelated), None);
    }
}
