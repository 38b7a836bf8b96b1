//! Clasificación de mensajes de error a códigos numéricos.
//!
//! Rol en el flujo:
//! - El paso Prepare produce mensajes de error de texto libre; la tabla de
//!   reglas los mapea a códigos de 5 dígitos estables que alimentan las
//!   métricas y el particionado por `errorType`.
//! - La tabla es **ordenada**: gana la primera regla cuyo patrón (cualquiera
//!   de ellos) matchee. El orden gobierna la precedencia entre patrones que
//!   se traslapan; cambiarlo es un cambio de contrato.
//! - Si ninguna regla matchea se asigna el código centinela `10999`.
//!
//! Familias de códigos:
//! - `10xxx` fallas de Prepare (descarga, archivo, proxy).
//! - `20xxx` fallas de Transform (scripts, esquema).
//! - `30xxx` fallas de Submit (rechazos, mirror).

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Código centinela cuando ninguna regla matchea.
pub const DEFAULT_ERROR_CODE: &str = "10999";

/// Una regla de clasificación: código destino + patrones que la activan.
pub struct ClassificationRule {
    pub code: &'static str,
    pub patterns: Vec<Regex>,
    pub description: &'static str,
}

fn rule(code: &'static str, patterns: &[&str], description: &'static str) -> (&'static str, ClassificationRule) {
    let compiled = patterns.iter()
                           .map(|p| Regex::new(p).expect("invalid classification pattern"))
                           .collect();
    (code, ClassificationRule { code, patterns: compiled, description })
}

/// Tabla ordenada de reglas. El orden de inserción ES la precedencia.
static RULE_TABLE: Lazy<IndexMap<&'static str, ClassificationRule>> = Lazy::new(|| {
    IndexMap::from_iter([
        // Prepare: backpressure primero (mensajes de throttling suelen
        // incluir también la palabra timeout).
        rule("10002",
             &[r"(?i)rate exceeded", r"ThrottlingException", r"(?i)too many requests", r"\b429\b"],
             "remote service throttling during download"),
        rule("10003",
             &[r"(?i)timed? ?out", r"(?i)deadline exceeded"],
             "download timed out"),
        rule("10001",
             &[r"(?i)failed to download", r"NoSuchKey", r"(?i)404 not found", r"(?i)connection (refused|reset)"],
             "source artifact download failure"),
        rule("10101",
             &[r"(?i)not a zip", r"(?i)invalid (zip )?archive", r"(?i)central directory"],
             "input archive corrupt or unreadable"),
        rule("10102",
             &[r"(?i)input\.csv (was )?not found", r"(?i)missing input\.csv"],
             "input archive lacks input.csv"),
        rule("10103",
             &[r"(?i)missing column:? ?county", r"(?i)county column (is )?(missing|absent)"],
             "input.csv lacks the county column"),
        rule("10201",
             &[r"(?i)proxy pool exhausted", r"(?i)no proxy available", r"(?i)stale proxy lock"],
             "proxy pool acquisition failure"),
        rule("10202",
             &[r"(?i)captcha"],
             "source portal presented a captcha"),
        rule("20001",
             &[r"SyntaxError", r"(?i)unexpected token", r"(?i)unexpected end of (input|file)"],
             "transform script failed to parse"),
        rule("20002",
             &[r"ReferenceError", r"TypeError", r"(?i)undefined is not"],
             "transform script runtime failure"),
        rule("20101",
             &[r"(?i)schema validation failed", r"(?i)does not conform to schema"],
             "transform output failed schema validation"),
        rule("20102",
             &[r"(?i)required property", r"(?i)missing required field"],
             "transform output lacks a required field"),
        rule("30001",
             &[r"(?i)submission rejected", r"(?i)400 bad request"],
             "submit endpoint rejected the payload"),
        rule("30002",
             &[r"(?i)mirror mismatch", r"(?i)mirror validation failed"],
             "submitted data disagrees with the mirror"),
    ])
});

/// Acceso de solo lectura a la tabla (para widgets/diagnóstico).
pub fn rule_table() -> &'static IndexMap<&'static str, ClassificationRule> {
    &RULE_TABLE
}

/// Clasifica un mensaje de texto libre al código de la primera regla que
/// matchee; `DEFAULT_ERROR_CODE` si ninguna lo hace. Puro y sin alocaciones
/// (los regex viven en la tabla estática).
pub fn classify(message: &str) -> &'static str {
    for rule in RULE_TABLE.values() {
        if rule.patterns.iter().any(|p| p.is_match(message)) {
            return rule.code;
        }
    }
    DEFAULT_ERROR_CODE
}

/// `errorType` de un código: los primeros 2 caracteres, o el código completo
/// si es más corto.
pub fn error_type(code: &str) -> &str {
    match code.char_indices().nth(2) {
        Some((idx, _)) => &code[..idx],
        None => code,
    }
}
