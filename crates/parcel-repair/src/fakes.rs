//! Dobles en memoria de los colaboradores externos.
//!
//! Paridad con el patrón del resto del workspace: cada backend externo tiene
//! una variante en memoria utilizable por tests y por el binario demo, con
//! la misma superficie que el real.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::collab::{AgentPatch, AgentRequest, BlobStore, MessageQueue, RepairAgent, ScriptValidator,
                    ValidationReport, WorkflowCallback};
use crate::error::RepairError;
use crate::uri::ObjectUri;

/// Object store en memoria, indexado por URI completa.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, uri: &ObjectUri, bytes: Vec<u8>) {
        self.objects.lock().expect("blob lock").insert(uri.to_string(), bytes);
    }

    pub fn bytes_at(&self, uri: &ObjectUri) -> Option<Vec<u8>> {
        self.objects.lock().expect("blob lock").get(&uri.to_string()).cloned()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, uri: &ObjectUri) -> Result<Vec<u8>, RepairError> {
        self.objects
            .lock()
            .expect("blob lock")
            .get(&uri.to_string())
            .cloned()
            .ok_or_else(|| RepairError::Blob(format!("object not found: {uri}")))
    }

    async fn put(&self, uri: &ObjectUri, bytes: Vec<u8>) -> Result<(), RepairError> {
        self.objects.lock().expect("blob lock").insert(uri.to_string(), bytes);
        Ok(())
    }
}

/// Cola que registra todo lo enviado.
#[derive(Default)]
pub struct RecordingQueue {
    messages: Mutex<Vec<Value>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Value> {
        self.messages.lock().expect("queue lock").clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn send(&self, payload: Value) -> Result<(), RepairError> {
        self.messages.lock().expect("queue lock").push(payload);
        Ok(())
    }
}

/// Agente guionado: devuelve siempre el mismo archive parchado y registra
/// los pedidos que recibió.
pub struct ScriptedAgent {
    patch: Vec<u8>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn returning(patch: Vec<u8>) -> Self {
        Self { patch, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().expect("agent lock").clone()
    }
}

#[async_trait]
impl RepairAgent for ScriptedAgent {
    async fn rewrite_scripts(&self, request: AgentRequest) -> Result<AgentPatch, RepairError> {
        self.requests.lock().expect("agent lock").push(request);
        Ok(AgentPatch { patched_archive: self.patch.clone(), cost: None })
    }
}

/// Validador guionado: entrega resultados preparados en orden FIFO.
#[derive(Default)]
pub struct ScriptedValidator {
    outcomes: Mutex<VecDeque<Result<ValidationReport, RepairError>>>,
    payloads: Mutex<Vec<Value>>,
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&self, transaction_items: Vec<Value>) {
        self.outcomes
            .lock()
            .expect("validator lock")
            .push_back(Ok(ValidationReport { status: "success".to_string(), transaction_items }));
    }

    pub fn push_rejection(&self, message: &str, new_errors_uri: Option<&str>) {
        self.outcomes
            .lock()
            .expect("validator lock")
            .push_back(Err(RepairError::ValidatorRejected { message: message.to_string(),
                                                            new_errors_uri:
                                                                new_errors_uri.map(str::to_string) }));
    }

    /// Payloads recibidos, en orden.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().expect("validator lock").clone()
    }
}

#[async_trait]
impl ScriptValidator for ScriptedValidator {
    async fn validate(&self, payload: Value) -> Result<ValidationReport, RepairError> {
        self.payloads.lock().expect("validator lock").push(payload);
        self.outcomes
            .lock()
            .expect("validator lock")
            .pop_front()
            .unwrap_or_else(|| Err(RepairError::Validation("no scripted validator outcome left".to_string())))
    }
}

/// Callback que registra éxitos y fallas.
#[derive(Default)]
pub struct RecordingCallback {
    successes: Mutex<Vec<(String, Value)>>,
    failures: Mutex<Vec<(String, String, String)>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> Vec<(String, Value)> {
        self.successes.lock().expect("callback lock").clone()
    }

    pub fn failures(&self) -> Vec<(String, String, String)> {
        self.failures.lock().expect("callback lock").clone()
    }
}

#[async_trait]
impl WorkflowCallback for RecordingCallback {
    async fn send_success(&self, task_token: &str, payload: Value) -> Result<(), RepairError> {
        self.successes.lock().expect("callback lock").push((task_token.to_string(), payload));
        Ok(())
    }

    async fn send_failure(&self, task_token: &str, error: &str, cause: &str) -> Result<(), RepairError> {
        self.failures
            .lock()
            .expect("callback lock")
            .push((task_token.to_string(), error.to_string(), cause.to_string()));
        Ok(())
    }
}
