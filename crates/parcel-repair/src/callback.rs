//! Payloads del callback hacia el motor de workflow.
//!
//! Éxito: `{output_s3_uri, county, taskToken}`. Falla: `error` lleva código
//! + condado y `cause` el JSON truncado a ≤256 caracteres (el motor rechaza
//! causas más largas).

use serde_json::{json, Value};

/// Longitud máxima de la causa aceptada por el motor de workflow.
pub const MAX_CAUSE_LEN: usize = 256;

pub fn success_payload(output_s3_uri: &str, county: &str, task_token: &str) -> Value {
    json!({
        "output_s3_uri": output_s3_uri,
        "county": county,
        "taskToken": task_token,
    })
}

/// `error` del callback de falla: código + condado.
pub fn failure_error(code: &str, county: &str) -> String {
    format!("{code}{county}")
}

/// Serializa la causa y la trunca a 256 caracteres (en límite de char).
pub fn truncated_cause(cause: &Value) -> String {
    let serialized = cause.to_string();
    if serialized.len() <= MAX_CAUSE_LEN {
        return serialized;
    }
    let mut end = MAX_CAUSE_LEN;
    while !serialized.is_char_boundary(end) {
        end -= 1;
    }
    serialized[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cause_is_truncated_to_the_engine_limit() {
        let long = json!({"details": "x".repeat(500)});
        let cause = truncated_cause(&long);
        assert!(cause.len() <= MAX_CAUSE_LEN);
        let short = json!({"ok": true});
        assert_eq!(truncated_cause(&short), short.to_string());
    }

    #[test]
    fn failure_error_concatenates_code_and_county() {
        assert_eq!(failure_error("10999", "palmbeach"), "10999palmbeach");
    }
}
