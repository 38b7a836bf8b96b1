//! Cascada de configuración del loop de reparación.
//!
//! Orden de resolución (gana el primer acierto):
//! 1. Blob específico del condado (`<prefix>/<county>/config.json`).
//! 2. Blob general (`<prefix>/config.json`).
//! 3. Variable de entorno específica del condado (`<COUNTY>_<KEY>`).
//! 4. Variable de entorno general (`<KEY>`).
//!
//! Las capas de blob se descargan una sola vez al construir la cascada; un
//! blob ausente o ilegible degrada a capa vacía (con warn), nunca rompe la
//! resolución. La secuencia completa queda enumerada en un solo lugar para
//! poder testearla.

use std::env;

use log::warn;
use serde_json::{Map, Value};

use crate::collab::BlobStore;
use crate::uri::ObjectUri;

enum Layer {
    Blob { label: String, values: Map<String, Value> },
    EnvPrefixed { prefix: String },
    Env,
}

pub struct ConfigCascade {
    layers: Vec<Layer>,
}

impl ConfigCascade {
    /// Construye la cascada descargando las capas de blob por adelantado.
    pub async fn load(county: &str, blob: &dyn BlobStore, county_config: Option<ObjectUri>,
                      general_config: Option<ObjectUri>)
                      -> Self {
        let mut layers = Vec::with_capacity(4);
        for (label, uri) in [("county-blob", county_config), ("general-blob", general_config)] {
            let Some(uri) = uri else { continue };
            match fetch_json_object(blob, &uri).await {
                Some(values) => layers.push(Layer::Blob { label: format!("{label}:{uri}"), values }),
                None => warn!("config layer unavailable, skipping: {label}:{uri}"),
            }
        }
        layers.push(Layer::EnvPrefixed { prefix: county.to_uppercase().replace('-', "_") });
        layers.push(Layer::Env);
        Self { layers }
    }

    /// Cascada sólo-entorno (sin blob store configurado).
    pub fn env_only(county: &str) -> Self {
        Self { layers: vec![Layer::EnvPrefixed { prefix: county.to_uppercase().replace('-', "_") }, Layer::Env] }
    }

    /// Resuelve una clave recorriendo las capas en orden.
    pub fn lookup(&self, key: &str) -> Option<String> {
        for layer in &self.layers {
            let hit = match layer {
                Layer::Blob { values, .. } => values.get(key).and_then(Value::as_str).map(str::to_string),
                Layer::EnvPrefixed { prefix } => env::var(format!("{prefix}_{key}")).ok(),
                Layer::Env => env::var(key).ok(),
            };
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}

async fn fetch_json_object(blob: &dyn BlobStore, uri: &ObjectUri) -> Option<Map<String, Value>> {
    let bytes = blob.get(uri).await.ok()?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::InMemoryBlobStore;

    #[tokio::test]
    async fn blob_layers_win_over_env() {
        let blob = InMemoryBlobStore::new();
        let county_uri = ObjectUri::new("cfg", "counties/palmbeach/config.json");
        let general_uri = ObjectUri::new("cfg", "config.json");
        blob.seed(&county_uri, br#"{"MAX_ATTEMPTS": "5"}"#.to_vec());
        blob.seed(&general_uri, br#"{"MAX_ATTEMPTS": "2", "QUEUE": "general-q"}"#.to_vec());

        let cascade = ConfigCascade::load("palmbeach", &blob, Some(county_uri), Some(general_uri)).await;
        // Específico de condado gana sobre general.
        assert_eq!(cascade.lookup("MAX_ATTEMPTS").as_deref(), Some("5"));
        // Cae a la capa general cuando el condado no define la clave.
        assert_eq!(cascade.lookup("QUEUE").as_deref(), Some("general-q"));
        assert_eq!(cascade.lookup("MISSING"), None);
    }

    #[tokio::test]
    async fn unreadable_blob_degrades_to_env() {
        let blob = InMemoryBlobStore::new();
        std::env::set_var("PALMBEACH_CASCADE_PROBE", "county-env");
        let cascade = ConfigCascade::load("palmbeach", &blob,
                                          Some(ObjectUri::new("cfg", "missing.json")), None).await;
        assert_eq!(cascade.lookup("CASCADE_PROBE").as_deref(), Some("county-env"));
        std::env::remove_var("PALMBEACH_CASCADE_PROBE");
    }
}
