//! Colaboradores externos del loop de reparación, detrás de traits async.
//!
//! Reemplazan el estado ambiente del sistema original (clientes singleton)
//! por dependencias explícitas inyectadas al construir el controller: cada
//! frontera de IO es un punto de suspensión y se puede simular en tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::csvdata::ParsedError;
use crate::error::RepairError;
use crate::uri::ObjectUri;

/// Object store (descarga/subida de archives y CSVs).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, uri: &ObjectUri) -> Result<Vec<u8>, RepairError>;
    async fn put(&self, uri: &ObjectUri, bytes: Vec<u8>) -> Result<(), RepairError>;
}

/// Cola de mensajes (cola de salida de transaction items y DLQ).
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send(&self, payload: Value) -> Result<(), RepairError>;
}

/// Pedido al agente de IA que reescribe los scripts de transformación.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub county: String,
    pub scripts_archive: Vec<u8>,
    pub errors: Vec<ParsedError>,
    pub prompt: String,
}

/// Costo reportado por una invocación del agente (hook opcional).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentCost {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Respuesta del agente: el archive parchado y el costo si se conoce.
#[derive(Debug, Clone)]
pub struct AgentPatch {
    pub patched_archive: Vec<u8>,
    pub cost: Option<AgentCost>,
}

#[async_trait]
pub trait RepairAgent: Send + Sync {
    async fn rewrite_scripts(&self, request: AgentRequest) -> Result<AgentPatch, RepairError>;
}

/// Respuesta del post-procesador de validación.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub status: String,
    pub transaction_items: Vec<Value>,
}

/// Post-procesador que valida el parche contra los insumos preparados.
///
/// Contrato: un rechazo llega como `RepairError::ValidatorRejected`; si el
/// validador generó un nuevo CSV de errores, su URI viaja en el campo tipado
/// (el fallback regex del controller sólo aplica a mensajes crudos).
#[async_trait]
pub trait ScriptValidator: Send + Sync {
    async fn validate(&self, payload: Value) -> Result<ValidationReport, RepairError>;
}

/// Callback hacia el motor de workflow (task tokens).
#[async_trait]
pub trait WorkflowCallback: Send + Sync {
    async fn send_success(&self, task_token: &str, payload: Value) -> Result<(), RepairError>;
    async fn send_failure(&self, task_token: &str, error: &str, cause: &str) -> Result<(), RepairError>;
}

/// Observador opcional de costos de agente. No es una dependencia dura: el
/// default no hace nada.
pub trait CostObserver: Send + Sync {
    fn record(&self, county: &str, cost: &AgentCost);
}

pub struct NoopCostObserver;

impl CostObserver for NoopCostObserver {
    fn record(&self, _county: &str, _cost: &AgentCost) {}
}
