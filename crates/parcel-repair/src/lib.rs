//! parcel-repair: loop de auto-reparación de scripts de transformación.
//!
//! Propósito:
//! - Orquestar el intento de reparación end-to-end: elegir la peor ejecución
//!   fallida, bajar insumos y scripts, invocar al agente de IA, subir los
//!   scripts parchados, validar, y confirmar (commit) o restaurar
//!   (rollback) con reintentos acotados.
//! - Al agotar reintentos: marcar los errores como `maybeUnrecoverable`,
//!   rutear a la DLQ (sólo escenario SVL) y borrar la ejecución.
//!
//! Componentes principales:
//! - `controller`: la máquina de estados del intento.
//! - `collab`: traits async de los colaboradores externos (object store,
//!   colas, agente, validador, callback del motor de workflow).
//! - `fakes`: dobles en memoria de esos colaboradores (tests y demo).
//! - `csvdata`: parsing del CSV de errores y etiqueta de escenario MVL/SVL.
//! - `uri`: URIs de object store (`s3://bucket/key`).
//! - `config`: cascada de configuración (blob específico de condado → blob
//!   general → env específico → env general).
//! - `prompt`: el prompt del agente como asset versionado con parámetros.
//! - `callback`: formato de payloads del callback (causa truncada a 256).

pub mod callback;
pub mod collab;
pub mod config;
pub mod controller;
pub mod csvdata;
pub mod error;
pub mod fakes;
pub mod prompt;
pub mod uri;
pub mod workdir;

// Re-exports públicos principales
pub use collab::{AgentCost, AgentPatch, AgentRequest, BlobStore, CostObserver, MessageQueue, NoopCostObserver,
                 RepairAgent, ScriptValidator, ValidationReport, WorkflowCallback};
pub use controller::{Collaborators, RepairConfig, RepairController, RepairOutcome};
pub use csvdata::{parse_errors_csv, ParsedError, Scenario};
pub use error::RepairError;
pub use prompt::PromptTemplate;
pub use uri::ObjectUri;
