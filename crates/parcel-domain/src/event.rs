//! Evento de workflow entrante y estatus asociados.
//!
//! Rol en el flujo:
//! - Cada fase del pipeline (Prepare → Transform → Submit) emite un
//!   `WorkflowEvent` por ejecución hacia el bus de eventos.
//! - El motor de ingesta consume `errors[]`; el motor de estado consume
//!   `(phase, step, status)` normalizado a un `Bucket` de tres valores.
//! - El contrato JSON es estable: campos camelCase, estatus en mayúsculas.
//!
//! Invariantes:
//! - Identificadores (executionId, county, dataGroupLabel, phase, step) nunca
//!   contienen `#`: ese carácter es el delimitador de sort keys compuestas.
//! - La redelivery del mismo evento produce el mismo `event_token()` (base de
//!   la idempotencia aguas abajo).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Estatus crudo reportado por el motor de workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Scheduled,
    InProgress,
    Running,
    Succeeded,
    Completed,
    Failed,
    Parked,
}

impl ExecutionStatus {
    /// Token estable del estatus crudo (igual al wire format).
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Scheduled => "SCHEDULED",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Parked => "PARKED",
        }
    }

    /// Normaliza el estatus crudo al modelo de tres buckets.
    ///
    /// Reglas: `SCHEDULED`/`RUNNING` → `IN_PROGRESS`, `COMPLETED` →
    /// `SUCCEEDED`, identidad sobre los tres buckets. `PARKED` cuenta como
    /// `IN_PROGRESS`: el trabajo estacionado no terminó ni falló.
    pub fn bucket(&self) -> Bucket {
        match self {
            ExecutionStatus::Scheduled | ExecutionStatus::Running | ExecutionStatus::InProgress | ExecutionStatus::Parked => {
                Bucket::InProgress
            }
            ExecutionStatus::Succeeded | ExecutionStatus::Completed => Bucket::Succeeded,
            ExecutionStatus::Failed => Bucket::Failed,
        }
    }
}

/// Bucket normalizado de ciclo de vida (modelo de tres estados).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
    InProgress,
    Failed,
    Succeeded,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::InProgress => "IN_PROGRESS",
            Bucket::Failed => "FAILED",
            Bucket::Succeeded => "SUCCEEDED",
        }
    }

    /// Nombre del atributo contador correspondiente en `StepAggregate`.
    pub fn counter_attribute(&self) -> &'static str {
        match self {
            Bucket::InProgress => "inProgressCount",
            Bucket::Failed => "failedCount",
            Bucket::Succeeded => "succeededCount",
        }
    }
}

/// Estatus de ciclo de vida de un error (y de su FailedExecution).
///
/// El wire format es camelCase (`failed`, `maybeSolved`,
/// `maybeUnrecoverable`); en sort keys se usa el token en mayúsculas sin
/// espacios (`FAILED`, `MAYBESOLVED`, `MAYBEUNRECOVERABLE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorStatus {
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "maybeSolved")]
    MaybeSolved,
    #[serde(rename = "maybeUnrecoverable")]
    MaybeUnrecoverable,
}

impl ErrorStatus {
    /// Valor wire (atributo persistido).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Failed => "failed",
            ErrorStatus::MaybeSolved => "maybeSolved",
            ErrorStatus::MaybeUnrecoverable => "maybeUnrecoverable",
        }
    }

    /// Token para sort keys compuestas (mayúsculas, sin espacios).
    pub fn sort_token(&self) -> &'static str {
        match self {
            ErrorStatus::Failed => "FAILED",
            ErrorStatus::MaybeSolved => "MAYBESOLVED",
            ErrorStatus::MaybeUnrecoverable => "MAYBEUNRECOVERABLE",
        }
    }
}

/// Un error individual dentro de un evento: código + detalles JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowError {
    pub code: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Referencia al objeto fuente (bucket + key) que originó la ejecución.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub bucket: String,
    pub key: String,
}

/// Evento de workflow tal como llega del bus.
///
/// `event_id` viaja en el sobre del bus; si falta, `event_token()` deriva un
/// identificador determinista del contenido para que la redelivery siga
/// siendo idempotente.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    #[serde(default)]
    pub event_id: String,
    pub execution_id: String,
    pub county: String,
    #[serde(default)]
    pub data_group_label: Option<String>,
    pub phase: String,
    pub step: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub task_token: Option<String>,
    /// URI del artefacto preparado (lo consume el loop de auto-reparación).
    #[serde(default)]
    pub prepared_s3_uri: Option<String>,
    /// URI del CSV de errores asociado a la ejecución.
    #[serde(default)]
    pub errors_s3_uri: Option<String>,
    /// Objeto fuente original, necesario para el fallback a DLQ.
    #[serde(default)]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub errors: Vec<WorkflowError>,
}

impl WorkflowEvent {
    /// Valida el evento antes de cualquier escritura.
    ///
    /// Rechaza identificadores vacíos o con `#` (romperían las sort keys
    /// compuestas) y códigos de error vacíos.
    pub fn validate(&self) -> Result<(), DomainError> {
        fn check(field: &str, value: &str) -> Result<(), DomainError> {
            if value.trim().is_empty() {
                return Err(DomainError::ValidationError(format!("{field} must not be empty")));
            }
            if value.contains('#') {
                return Err(DomainError::ValidationError(format!("{field} must not contain '#': {value}")));
            }
            Ok(())
        }

        check("executionId", &self.execution_id)?;
        check("county", &self.county)?;
        check("phase", &self.phase)?;
        check("step", &self.step)?;
        if let Some(dg) = &self.data_group_label {
            if dg.contains('#') {
                return Err(DomainError::ValidationError(format!("dataGroupLabel must not contain '#': {dg}")));
            }
        }
        for e in &self.errors {
            if e.code.is_empty() {
                return Err(DomainError::ValidationError("error code must not be empty".to_string()));
            }
            if e.code.contains('#') {
                return Err(DomainError::ValidationError(format!("error code must not contain '#': {}", e.code)));
            }
        }
        Ok(())
    }

    /// Etiqueta de data-group efectiva (cadena vacía cuando no viene).
    pub fn data_group(&self) -> &str {
        self.data_group_label.as_deref().unwrap_or("")
    }

    /// Identificador idempotente del evento.
    ///
    /// Usa `event_id` del sobre si está presente; si no, deriva un hash
    /// estable de los campos identificatorios. La redelivery del mismo
    /// payload produce el mismo token.
    pub fn event_token(&self) -> String {
        if !self.event_id.is_empty() {
            return self.event_id.clone();
        }
        let mut hasher = Sha256::new();
        hasher.update(self.execution_id.as_bytes());
        hasher.update(b"#");
        hasher.update(self.county.as_bytes());
        hasher.update(b"#");
        hasher.update(self.phase.as_bytes());
        hasher.update(b"#");
        hasher.update(self.step.as_bytes());
        hasher.update(b"#");
        hasher.update(self.status.as_str().as_bytes());
        for e in &self.errors {
            hasher.update(b"#");
            hasher.update(e.code.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
