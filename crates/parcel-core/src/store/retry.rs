//! Retry con backoff exponencial para clases transitorias.
//!
//! Política:
//! - Sólo reintenta `Throttled` / `TransactionConflict` / `TransientIo`.
//! - Backoff exponencial con tope; se emite `warn!` por intento.
//! - No altera semántica de negocio; sólo repite la unidad de trabajo
//!   provista por `f`.

use std::time::Duration;

use log::warn;

use super::error::StoreError;

/// Parámetros de reintento. La ingesta usa al menos 10 intentos; las
/// operaciones interactivas usan la variante corta.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Política de la ingesta: ≥10 intentos para clases transitorias.
    pub fn ingest() -> Self {
        Self { max_attempts: 10,
               base_delay: Duration::from_millis(25),
               max_delay: Duration::from_secs(2) }
    }

    /// Política corta para lecturas/escrituras interactivas.
    pub fn quick() -> Self {
        Self { max_attempts: 3,
               base_delay: Duration::from_millis(15),
               max_delay: Duration::from_millis(200) }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_delay)
    }
}

/// Repite `f` mientras falle con una clase transitoria y queden intentos.
pub fn with_retry<F, T>(policy: &RetryPolicy, mut f: F) -> Result<T, StoreError>
    where F: FnMut() -> Result<T, StoreError>
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!("retryable store error (attempt {}): {} -> sleeping {:?}", attempt + 1, e, delay);
                std::thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}
