//! Mutador de estatus de errores en bloque.
//!
//! Rol en el flujo:
//! - Tras una reparación exitosa, `mark_solved_for_hashes` marca el mismo
//!   fingerprint como probablemente-arreglado en TODAS las ejecuciones que
//!   lo comparten; al agotar reintentos, las variantes `unrecoverable` hacen
//!   la propagación simétrica.
//! - Cada flip decrementa `openErrorCount` de su ejecución; al llegar a 0 la
//!   fila FailedExecution se borra junto con todos sus links.
//!
//! Idempotencia:
//! - Los flips llevan condición `status = failed` (evita doble decremento) y
//!   el decremento lleva condición sobre el valor leído; re-ejecutar con el
//!   mismo input alcanza el mismo estado terminal.
//! - `ConditionFailed` aborta y se propaga: el llamador re-ejecuta la
//!   operación completa (a diferencia del motor de estado, que relee y
//!   re-decide en el momento).

use chrono::Utc;
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

use parcel_domain::ErrorStatus;

use crate::constants::ENTITY_EXECUTION_ERROR_LINK;
use crate::errors::EngineError;
use crate::keys::{error_key, execution_key, failed_execution_gsi1_sk, failed_execution_gsi3_sk};
use crate::model::{attr, ErrorRecord, ExecutionErrorLink, FailedExecution};
use crate::store::{with_retry, Condition, IndexId, ItemKey, KeyValueStore, QueryRequest, RetryPolicy, TableId,
                   TransactItem, UpdateExpr};

/// Resumen de una mutación en bloque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub links_flipped: usize,
    pub executions_deleted: Vec<String>,
    pub records_updated: usize,
}

pub struct StatusMutator<S: KeyValueStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KeyValueStore> StatusMutator<S> {
    pub fn new(store: S) -> Self {
        Self { store, retry: RetryPolicy::ingest() }
    }

    /// Marca `maybeSolved` todos los links (y registros) de los hashes
    /// dados, restringido al condado indicado.
    pub fn mark_solved_for_hashes(&self, hashes: &[String], county: &str) -> Result<MutationReport, EngineError> {
        self.propagate(hashes, ErrorStatus::MaybeSolved, Some(county))
    }

    /// Propagación simétrica a `maybeUnrecoverable` para un código.
    pub fn mark_unrecoverable_for_code(&self, code: &str) -> Result<MutationReport, EngineError> {
        let codes = vec![code.to_string()];
        self.propagate(&codes, ErrorStatus::MaybeUnrecoverable, None)
    }

    /// Marca `maybeUnrecoverable` todos los códigos presentes en una
    /// ejecución, propagando a las demás ejecuciones que los comparten.
    pub fn mark_unrecoverable_for_execution(&self, execution_id: &str) -> Result<MutationReport, EngineError> {
        let codes: Vec<String> = self.links_of(execution_id)?
                                     .into_iter()
                                     .map(|link| link.error_code)
                                     .collect();
        if codes.is_empty() {
            return Ok(MutationReport::default());
        }
        self.propagate(&codes, ErrorStatus::MaybeUnrecoverable, None)
    }

    /// Links de una ejecución (paginados).
    pub fn links_of(&self, execution_id: &str) -> Result<Vec<ExecutionErrorLink>, EngineError> {
        let mut links = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = QueryRequest::new(TableId::Tracking, IndexId::Primary, execution_key(execution_id));
            request.sk_prefix = Some("ERROR#".to_string());
            request.limit = Some(100);
            request.cursor = cursor.take();
            let page = with_retry(&self.retry, || self.store.query(&request))?;
            for item in &page.items {
                links.push(ExecutionErrorLink::from_item(item)?);
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(links)
    }

    /// Borra la fila FailedExecution y todos sus links. Devuelve la cantidad
    /// de ítems borrados; borrar lo ya-borrado es no-op.
    pub fn delete_execution(&self, execution_id: &str) -> Result<usize, EngineError> {
        let mut deleted = 0usize;
        loop {
            // Sin cursor a propósito: cada vuelta borra la página y vuelve a
            // consultar, porque un cursor sobre ítems recién borrados no
            // puede reanudarse.
            let mut request = QueryRequest::new(TableId::Tracking, IndexId::Primary, execution_key(execution_id));
            request.limit = Some(100);
            let page = with_retry(&self.retry, || self.store.query(&request))?;
            if page.items.is_empty() {
                break;
            }
            let mut tx = Vec::with_capacity(page.items.len());
            for item in &page.items {
                let pk = item.get("pk").and_then(Value::as_str).unwrap_or_default().to_string();
                let sk = item.get("sk").and_then(Value::as_str).unwrap_or_default().to_string();
                tx.push(TransactItem::Delete { table: TableId::Tracking,
                                               key: ItemKey::new(pk, sk),
                                               condition: None });
            }
            deleted += tx.len();
            with_retry(&self.retry, || self.store.transact_write_chunked(tx.clone(), None))?;
            if page.cursor.is_none() {
                break;
            }
        }
        debug!("mutate:delete-execution execution_id={execution_id} items={deleted}");
        Ok(deleted)
    }

    fn propagate(&self, codes: &[String], new_status: ErrorStatus, county: Option<&str>)
                 -> Result<MutationReport, EngineError> {
        let mut report = MutationReport::default();

        // Dedup preservando orden de entrada.
        let mut unique_codes: Vec<&str> = Vec::new();
        for code in codes {
            if !unique_codes.contains(&code.as_str()) {
                unique_codes.push(code.as_str());
            }
        }

        // 1. Lookup inverso: código → ejecuciones que lo contienen.
        let mut per_execution: IndexMap<String, Vec<String>> = IndexMap::new();
        for code in &unique_codes {
            for link in self.executions_linked_to(code)? {
                if let Some(county) = county {
                    if link.county != county {
                        continue;
                    }
                }
                per_execution.entry(link.execution_id.clone()).or_default().push(link.error_code.clone());
            }
        }

        // 2. Por ejecución afectada: flips + decremento (o borrado en cero).
        for (execution_id, exec_codes) in &per_execution {
            self.apply_to_execution(execution_id, exec_codes, new_status, &mut report)?;
        }

        // 3. Por código: estatus del registro + reescritura de sort keys.
        for code in &unique_codes {
            if self.update_record_status(code, new_status)? {
                report.records_updated += 1;
            }
        }

        debug!("mutate:propagate status={} codes={} flips={} deleted={} records={}",
               new_status.as_str(),
               unique_codes.len(),
               report.links_flipped,
               report.executions_deleted.len(),
               report.records_updated);
        Ok(report)
    }

    /// Links que apuntan a un código, vía la arista inversa del GSI1.
    fn executions_linked_to(&self, code: &str) -> Result<Vec<ExecutionErrorLink>, EngineError> {
        let mut links = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = QueryRequest::new(TableId::Tracking, IndexId::Gsi1, error_key(code));
            request.entity_type = Some(ENTITY_EXECUTION_ERROR_LINK.to_string());
            request.limit = Some(100);
            request.cursor = cursor.take();
            let page = with_retry(&self.retry, || self.store.query(&request))?;
            for item in &page.items {
                links.push(ExecutionErrorLink::from_item(item)?);
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(links)
    }

    fn apply_to_execution(&self, execution_id: &str, codes: &[String], new_status: ErrorStatus,
                          report: &mut MutationReport)
                          -> Result<(), EngineError> {
        let exec_key = FailedExecution::key_for(execution_id);
        let Some(item) = with_retry(&self.retry, || self.store.get_item(TableId::Tracking, &exec_key))? else {
            // La ejecución ya fue borrada por una corrida anterior.
            return Ok(());
        };
        let exec = FailedExecution::from_item(&item)?;

        // Sólo cuentan los links que siguen abiertos (status = failed).
        let mut flips: Vec<String> = Vec::new();
        for code in codes {
            let link_key = ExecutionErrorLink::key_for(execution_id, code);
            let Some(link_item) = with_retry(&self.retry, || self.store.get_item(TableId::Tracking, &link_key))?
            else {
                continue;
            };
            if ExecutionErrorLink::from_item(&link_item)?.status == ErrorStatus::Failed {
                flips.push(code.clone());
            }
        }
        if flips.is_empty() {
            return Ok(());
        }

        let new_open = exec.open_error_count.saturating_sub(flips.len() as u64);
        report.links_flipped += flips.len();
        if new_open == 0 {
            // Último error abierto: la ejecución desaparece con sus links.
            self.delete_execution(execution_id)?;
            report.executions_deleted.push(execution_id.to_string());
            return Ok(());
        }

        let now = Utc::now();
        let mut tx: Vec<TransactItem> = Vec::with_capacity(flips.len() + 1);
        for code in &flips {
            tx.push(TransactItem::Update { table: TableId::Tracking,
                                           key: ExecutionErrorLink::key_for(execution_id, code),
                                           expr: UpdateExpr::new().set("status", attr(&new_status)),
                                           condition:
                                               Some(Condition::Equals("status".to_string(),
                                                                      attr(&ErrorStatus::Failed))) });
        }
        let exec_expr = UpdateExpr::new().set("openErrorCount", Value::from(new_open))
                                         .set("updatedAt", attr(&now))
                                         .set("gsi1sk", failed_execution_gsi1_sk(new_open, execution_id))
                                         .set("gsi3sk",
                                              failed_execution_gsi3_sk(&exec.error_type, exec.status, new_open,
                                                                       execution_id));
        tx.push(TransactItem::Update { table: TableId::Tracking,
                                       key: exec_key,
                                       expr: exec_expr,
                                       condition:
                                           Some(Condition::Equals("openErrorCount".to_string(),
                                                                  Value::from(exec.open_error_count))) });
        with_retry(&self.retry, || self.store.transact_write_chunked(tx.clone(), None))?;
        Ok(())
    }

    fn update_record_status(&self, code: &str, new_status: ErrorStatus) -> Result<bool, EngineError> {
        let key = ErrorRecord::key_for(code);
        let Some(item) = with_retry(&self.retry, || self.store.get_item(TableId::Tracking, &key))? else {
            return Ok(false);
        };
        let mut record = ErrorRecord::from_item(&item)?;
        record.status = new_status;
        let expr = UpdateExpr::new().set("status", attr(&new_status))
                                    .set("updatedAt", attr(&Utc::now()))
                                    .set("gsi2sk", record.gsi2_sk())
                                    .set("gsi3sk", record.gsi3_sk());
        with_retry(&self.retry, || {
            self.store
                .update_item(TableId::Tracking, &key, expr.clone(),
                             Some(Condition::AttributeExists("errorCode".to_string())))
                .map(|_| ())
        })?;
        Ok(true)
    }
}
