//! Selector de ejecuciones (sólo lectura).
//!
//! Devuelve la ejecución con más (o menos) errores abiertos, opcionalmente
//! filtrada por `errorType`, junto con su set completo de links. El loop de
//! auto-reparación lo usa para elegir su próximo objetivo.
//!
//! La dirección de orden es un parámetro explícito (`SortOrder`): el código
//! original tenía un call site ambiguo entre "most" y "least", así que aquí
//! el llamador siempre lo dice.

use log::debug;

use crate::constants::{ENTITY_FAILED_EXECUTION, METRIC_ERRORCOUNT};
use crate::errors::EngineError;
use crate::keys::execution_key;
use crate::model::{ExecutionErrorLink, FailedExecution};
use crate::store::{with_retry, IndexId, KeyValueStore, QueryRequest, RetryPolicy, TableId};

/// Dirección del rango: `Most` = mayor openErrorCount primero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Most,
    Least,
}

/// Ejecución elegida + su set completo de errores.
#[derive(Debug, Clone)]
pub struct SelectedExecution {
    pub execution: FailedExecution,
    pub errors: Vec<ExecutionErrorLink>,
}

pub struct ExecutionSelector<S: KeyValueStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: KeyValueStore> ExecutionSelector<S> {
    pub fn new(store: S) -> Self {
        Self { store, retry: RetryPolicy::quick() }
    }

    /// Atajo: ejecución con más errores abiertos.
    pub fn execution_with_most(&self, error_type: Option<&str>) -> Result<Option<SelectedExecution>, EngineError> {
        self.execution_with(SortOrder::Most, error_type)
    }

    /// Atajo: ejecución con menos errores abiertos.
    pub fn execution_with_least(&self, error_type: Option<&str>) -> Result<Option<SelectedExecution>, EngineError> {
        self.execution_with(SortOrder::Least, error_type)
    }

    /// Selección con dirección explícita. `error_type`, si viene, se recorta
    /// y no puede quedar vacío.
    pub fn execution_with(&self, order: SortOrder, error_type: Option<&str>)
                          -> Result<Option<SelectedExecution>, EngineError> {
        let error_type = match error_type {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(EngineError::Validation("errorType must not be blank".to_string()));
                }
                Some(trimmed)
            }
            None => None,
        };

        let mut request = match error_type {
            // Sin filtro: GSI1 ordena por COUNT#<pad10(open)>#EXECUTION#<id>.
            None => QueryRequest::new(TableId::Tracking, IndexId::Gsi1, METRIC_ERRORCOUNT),
            // Con filtro: GSI3 con prefijo COUNT#<errorType>#.
            Some(t) => {
                let mut r = QueryRequest::new(TableId::Tracking, IndexId::Gsi3, METRIC_ERRORCOUNT);
                r.sk_prefix = Some(format!("COUNT#{t}#"));
                r
            }
        };
        request.forward = matches!(order, SortOrder::Least);
        request.limit = Some(1);
        request.entity_type = Some(ENTITY_FAILED_EXECUTION.to_string());

        let page = with_retry(&self.retry, || self.store.query(&request))?;
        let Some(item) = page.items.first() else {
            debug!("select:none order={order:?} error_type={error_type:?}");
            return Ok(None);
        };
        let execution = FailedExecution::from_item(item)?;
        let errors = self.links_of(&execution.execution_id)?;
        debug!("select:picked execution_id={} open={} order={order:?}",
               execution.execution_id,
               execution.open_error_count);
        Ok(Some(SelectedExecution { execution, errors }))
    }

    /// Set completo de links de la ejecución, paginado.
    fn links_of(&self, execution_id: &str) -> Result<Vec<ExecutionErrorLink>, EngineError> {
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
}
