//! Motor de ingesta de errores.
//!
//! Rol en el flujo:
//! - Consume eventos de workflow y materializa FailedExecution +
//!   ExecutionErrorLink + ErrorRecord con incrementos atómicos.
//! - Una ingesta es todo-o-nada para la ejecución y sus links (una
//!   transacción con token del evento); los totales de ErrorRecord pueden
//!   retrasarse lo que duren sus reescrituras y convergen. Los conteos de
//!   la ejecución, sus links y la arista inversa son estrictos por evento.
//!
//! Particionado de transacciones:
//! - La plataforma prohíbe dos operaciones sobre el mismo ítem en una
//!   transacción, y las sort keys GSI2/GSI3 del ErrorRecord dependen del
//!   `totalCount` post-incremento. Por eso cada ErrorRecord se incrementa en
//!   una escritura idempotente separada (token derivado de evento+código) y
//!   un follow-up reescribe sus sort keys con el contador ya incrementado.
//!
//! Fallas:
//! - Clases transitorias se reintentan con backoff (≥10 intentos); cualquier
//!   error no reintentable aborta la ingesta y se propaga — el bus de
//!   eventos reentrega y el token garantiza que la repetición sea no-op.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

use parcel_domain::{error_type, ErrorStatus, WorkflowEvent};

use crate::constants::{ENTITY_ERROR_RECORD, ENTITY_EXECUTION_ERROR_LINK, ENTITY_FAILED_EXECUTION,
                       METRIC_ERRORCOUNT, METRIC_ERRORCOUNT_ERROR, TYPE_ERROR};
use crate::errors::EngineError;
use crate::keys::{error_key, execution_key, failed_execution_gsi1_sk, failed_execution_gsi3_sk};
use crate::model::{attr, ErrorRecord, ExecutionErrorLink, FailedExecution};
use crate::store::{with_retry, Condition, IndexId, KeyValueStore, QueryRequest, RetryPolicy, StoreError, TableId,
                   TransactItem, UpdateExpr};

/// Resultado de una ingesta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// El evento no traía errores; no se escribe nada (el motor de estado
    /// corre igual).
    NoErrors,
    Ingested {
        unique_codes: usize,
        /// Códigos que no existían todavía para esta ejecución.
        new_codes: u64,
        total_occurrences: u64,
    },
}

struct ErrorGroup {
    occurrences: u64,
    first_details: Value,
}

pub struct IngestEngine<S: KeyValueStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KeyValueStore> IngestEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store, retry: RetryPolicy::ingest() }
    }

    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Ingesta un evento completo. Idempotente frente a redelivery.
    pub fn ingest(&self, event: &WorkflowEvent) -> Result<IngestOutcome, EngineError> {
        event.validate()?;
        if event.errors.is_empty() {
            return Ok(IngestOutcome::NoErrors);
        }
        let token = event.event_token();
        debug!("ingest:start execution_id={} errors={} token={}",
               event.execution_id,
               event.errors.len(),
               token);
        let now = Utc::now();

        // Agrupar por código preservando el PRIMER details observado: los
        // replays producen estado idéntico.
        let mut groups: IndexMap<String, ErrorGroup> = IndexMap::new();
        for error in &event.errors {
            let entry = groups.entry(error.code.clone()).or_insert_with(|| ErrorGroup { occurrences: 0,
                                                                                        first_details:
                                                                                            error.details.clone() });
            entry.occurrences += 1;
        }
        let total_occurrences: u64 = groups.values().map(|g| g.occurrences).sum();

        // TODOS los códigos ya enlazados a la ejecución (eventos previos
        // incluidos): deciden cuánto crecen uniqueErrorCount/openErrorCount
        // y entran al cálculo del tipo dominante.
        let existing_codes = self.linked_codes(&event.execution_id)?;
        let new_codes = groups.keys().filter(|c| !existing_codes.contains(c.as_str())).count() as u64;

        // Tipo dominante sobre el conjunto ACUMULADO de la ejecución
        // (códigos previos ∪ lote actual): si todos comparten tipo se fija
        // en la ejecución; si no, queda vacío. Un lote de un solo tipo no
        // puede pisar una mezcla acumulada.
        let mut type_iter = existing_codes.iter()
                                          .map(|c| error_type(c))
                                          .chain(groups.keys().map(|c| error_type(c)));
        let first_type = type_iter.next().unwrap_or("");
        let dominant = if type_iter.all(|t| t == first_type) {
            first_type.to_string()
        } else {
            String::new()
        };

        let exec_key = FailedExecution::key_for(&event.execution_id);
        let current = with_retry(&self.retry, || self.store.get_item(TableId::Tracking, &exec_key))?;
        let open_before = current.as_ref()
                                 .and_then(|i| i.get("openErrorCount"))
                                 .and_then(Value::as_u64)
                                 .unwrap_or(0);
        let status = current.as_ref()
                            .and_then(|i| i.get("status"))
                            .and_then(|v| serde_json::from_value::<ErrorStatus>(v.clone()).ok())
                            .unwrap_or(ErrorStatus::Failed);
        let open_after = open_before + new_codes;

        // Transacción atómica: ejecución + todos sus links.
        let mut tx: Vec<TransactItem> = Vec::with_capacity(groups.len() + 1);
        tx.push(TransactItem::Update { table: TableId::Tracking,
                                       key: exec_key,
                                       expr: self.failed_execution_upsert(event, &dominant, new_codes,
                                                                          total_occurrences, open_after, status,
                                                                          &now),
                                       condition: None });
        for (code, group) in &groups {
            tx.push(TransactItem::Update { table: TableId::Tracking,
                                           key: ExecutionErrorLink::key_for(&event.execution_id, code),
                                           expr: link_upsert(event, code, group),
                                           condition: None });
        }
        with_retry(&self.retry, || self.store.transact_write_chunked(tx.clone(), Some(token.clone())))?;

        // Registros de error: escrituras separadas que convergen.
        for (code, group) in &groups {
            self.upsert_error_record(code, group, &token, &now)?;
        }

        debug!("ingest:done execution_id={} unique={} new={} total={}",
               event.execution_id,
               groups.len(),
               new_codes,
               total_occurrences);
        Ok(IngestOutcome::Ingested { unique_codes: groups.len(),
                                     new_codes,
                                     total_occurrences })
    }

    /// Códigos ya enlazados a la ejecución, paginando sobre la partición
    /// primaria de sus links (`EXECUTION#<id>` / `ERROR#...`).
    fn linked_codes(&self, execution_id: &str) -> Result<HashSet<String>, EngineError> {
        let mut codes = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = QueryRequest::new(TableId::Tracking, IndexId::Primary, execution_key(execution_id));
            request.sk_prefix = Some("ERROR#".to_string());
            request.limit = Some(100);
            request.cursor = cursor.take();
            let page = with_retry(&self.retry, || self.store.query(&request))?;
            for item in &page.items {
                if let Some(code) = item.get("errorCode").and_then(Value::as_str) {
                    codes.insert(code.to_string());
                }
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(codes)
    }

    fn failed_execution_upsert(&self, event: &WorkflowEvent, dominant: &str, new_codes: u64,
                               total_occurrences: u64, open_after: u64, status: ErrorStatus, now: &DateTime<Utc>)
                               -> UpdateExpr {
        let mut expr = UpdateExpr::new().set("executionId", event.execution_id.as_str())
                                        .set("county", event.county.as_str())
                                        .set("entityType", ENTITY_FAILED_EXECUTION)
                                        .set("errorType", dominant)
                                        .add("uniqueErrorCount", new_codes as i64)
                                        .add("totalOccurrences", total_occurrences as i64)
                                        .add("openErrorCount", new_codes as i64)
                                        .set_if_absent("status", attr(&ErrorStatus::Failed))
                                        .set_if_absent("createdAt", attr(now))
                                        .set("updatedAt", attr(now))
                                        .set("gsi1pk", METRIC_ERRORCOUNT)
                                        .set("gsi1sk", failed_execution_gsi1_sk(open_after, &event.execution_id))
                                        .set("gsi3pk", METRIC_ERRORCOUNT)
                                        .set("gsi3sk",
                                             failed_execution_gsi3_sk(dominant, status, open_after,
                                                                      &event.execution_id));
        if let Some(uri) = &event.prepared_s3_uri {
            expr = expr.set("preparedS3Uri", uri.as_str());
        }
        if let Some(uri) = &event.errors_s3_uri {
            expr = expr.set("errorsS3Uri", uri.as_str());
        }
        if let Some(source) = &event.source {
            expr = expr.set("source", attr(source));
        }
        if let Some(task_token) = &event.task_token {
            expr = expr.set("taskToken", task_token.as_str());
        }
        expr
    }

    fn upsert_error_record(&self, code: &str, group: &ErrorGroup, event_token: &str, now: &DateTime<Utc>)
                           -> Result<(), EngineError> {
        let key = ErrorRecord::key_for(code);
        let expr = UpdateExpr::new().set("errorCode", code)
                                    .set("errorType", error_type(code))
                                    .set("entityType", ENTITY_ERROR_RECORD)
                                    .add("totalCount", group.occurrences as i64)
                                    .set_if_absent("errorDetails", group.first_details.clone())
                                    .set_if_absent("status", attr(&ErrorStatus::Failed))
                                    .set_if_absent("createdAt", attr(now))
                                    .set("updatedAt", attr(now))
                                    .set("gsi1pk", TYPE_ERROR)
                                    .set("gsi1sk", error_key(code))
                                    .set("gsi2pk", TYPE_ERROR)
                                    .set("gsi3pk", METRIC_ERRORCOUNT_ERROR);
        // Escritura idempotente: transacción de un ítem con token derivado
        // de (evento, código).
        let tx = vec![TransactItem::Update { table: TableId::Tracking,
                                             key: key.clone(),
                                             expr,
                                             condition: None }];
        let tx_token = record_write_token(event_token, code);
        with_retry(&self.retry, || self.store.transact_write(tx.clone(), Some(tx_token.clone())))?;

        // Follow-up: las sort keys GSI2/GSI3 embeben el contador
        // post-incremento y el estatus vigente.
        let item = with_retry(&self.retry, || self.store.get_item(TableId::Tracking, &key))?
            .ok_or(StoreError::NotFound)?;
        let record = ErrorRecord::from_item(&item)?;
        let rewrite = UpdateExpr::new().set("gsi2sk", record.gsi2_sk()).set("gsi3sk", record.gsi3_sk());
        with_retry(&self.retry, || {
            self.store
                .update_item(TableId::Tracking, &key, rewrite.clone(),
                             Some(Condition::AttributeExists("errorCode".to_string())))
                .map(|_| ())
        })?;
        Ok(())
    }
}

fn link_upsert(event: &WorkflowEvent, code: &str, group: &ErrorGroup) -> UpdateExpr {
    UpdateExpr::new().set("executionId", event.execution_id.as_str())
                     .set("errorCode", code)
                     .set("county", event.county.as_str())
                     .set("entityType", ENTITY_EXECUTION_ERROR_LINK)
                     .add("occurrences", group.occurrences as i64)
                     .set_if_absent("status", attr(&ErrorStatus::Failed))
                     .set_if_absent("errorDetails", group.first_details.clone())
                     .set("gsi1pk", error_key(code))
                     .set("gsi1sk", execution_key(&event.execution_id))
}

/// Token de escritura de un ErrorRecord: hash corto de (evento, código).
fn record_write_token(event_token: &str, code: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(event_token.as_bytes());
    hasher.update(b"#");
    hasher.update(code.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex[..32].to_string()
}
