//! Configuración central del proceso.
//! Carga variables de entorno (.env) y expone una estructura inmutable
//! (`CONFIG`). Los valores del loop de reparación pueden además resolverse
//! por condado vía la cascada de `parcel-repair` en runtime.

use once_cell::sync::Lazy;
use std::env;

use parcel_repair::RepairConfig;

/// Configuración global de la aplicación.
pub struct AppConfig {
    /// Parámetros del loop de auto-reparación.
    pub repair: RepairConfig,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    let _ = dotenvy::dotenv(); // ignora error si no existe .env
    let max_attempts = env::var("REPAIR_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(3);
    let error_type_filter = env::var("REPAIR_ERROR_TYPE").ok().filter(|v| !v.trim().is_empty());
    AppConfig { repair: RepairConfig { max_attempts,
                                       scripts_bucket: env_or("SCRIPTS_BUCKET", "parcel-scripts"),
                                       transform_prefix: env_or("TRANSFORM_PREFIX", "transform-scripts"),
                                       error_type_filter } }
});
