//! CSV de errores de validación y etiqueta de escenario.
//!
//! Formato entrante: UTF-8, primera fila de cabeceras. Columnas de interés
//! (el productor alterna entre camelCase y snake_case, se aceptan ambas):
//! `errorMessage`/`error_message`, `errorPath`/`error_path`,
//! `data_group_cid`, `file_path`, `currentValue`. Líneas en blanco se
//! saltan; los campos se recortan.

use csv::ReaderBuilder;

use parcel_domain::{fingerprint, Fingerprint};

use crate::error::RepairError;

/// Escenario del artefacto de errores, derivado del sufijo de su key.
///
/// Regla exacta: sufijo `mvl_errors.csv` → MVL (mirror validation); todo lo
/// demás → SVL (schema validation). MVL nunca rutea a la DLQ al agotarse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Mvl,
    Svl,
}

impl Scenario {
    pub fn from_errors_uri(uri: &str) -> Self {
        if uri.ends_with("mvl_errors.csv") {
            Scenario::Mvl
        } else {
            Scenario::Svl
        }
    }

    pub fn routes_to_dlq(&self) -> bool {
        matches!(self, Scenario::Svl)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Mvl => "MVL",
            Scenario::Svl => "SVL",
        }
    }
}

/// Una fila de error ya normalizada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedError {
    pub message: String,
    pub path: String,
    pub data_group_cid: Option<String>,
    pub file_path: Option<String>,
    pub current_value: Option<String>,
}

impl ParsedError {
    /// Fingerprint estable del error dentro de un condado (mismo contrato
    /// que el dominio: sin normalización de espacios).
    pub fn fingerprint(&self, county: &str) -> Fingerprint {
        fingerprint(&self.message, &self.path, county)
    }
}

/// Lee el CSV completo. Filas sin mensaje Y sin path se descartan (líneas
/// vacías o de relleno).
pub fn parse_errors_csv(bytes: &[u8]) -> Result<Vec<ParsedError>, RepairError> {
    let mut reader = ReaderBuilder::new().has_headers(true)
                                         .flexible(true)
                                         .from_reader(bytes);
    let headers = reader.headers().map_err(|e| RepairError::Csv(e.to_string()))?.clone();
    let column = |names: &[&str]| -> Option<usize> {
        headers.iter().position(|h| names.contains(&h.trim()))
    };
    let message_col = column(&["errorMessage", "error_message"]);
    let path_col = column(&["errorPath", "error_path"]);
    let dg_col = column(&["data_group_cid"]);
    let file_col = column(&["file_path"]);
    let value_col = column(&["currentValue"]);
    if message_col.is_none() {
        return Err(RepairError::Csv("errors csv lacks an errorMessage column".to_string()));
    }

    let cell = |record: &csv::StringRecord, idx: Option<usize>| -> Option<String> {
        idx.and_then(|i| record.get(i)).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
    };

    let mut parsed = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RepairError::Csv(e.to_string()))?;
        let message = cell(&record, message_col);
        let path = cell(&record, path_col);
        if message.is_none() && path.is_none() {
            continue; // línea en blanco o de relleno
        }
        parsed.push(ParsedError { message: message.unwrap_or_default(),
                                  path: path.unwrap_or_default(),
                                  data_group_cid: cell(&record, dg_col),
                                  file_path: cell(&record, file_col),
                                  current_value: cell(&record, value_col) });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_tag_uses_the_exact_suffix() {
        assert_eq!(Scenario::from_errors_uri("s3://b/county/mvl_errors.csv"), Scenario::Mvl);
        assert_eq!(Scenario::from_errors_uri("s3://b/county/errors.csv"), Scenario::Svl);
        // El sufijo es exacto: un nombre que apenas lo contiene no es MVL.
        assert_eq!(Scenario::from_errors_uri("s3://b/mvl_errors.csv.bak"), Scenario::Svl);
        assert!(!Scenario::Mvl.routes_to_dlq());
        assert!(Scenario::Svl.routes_to_dlq());
    }

    #[test]
    fn parses_rows_and_skips_blanks() {
        let csv = "errorMessage,errorPath,data_group_cid,currentValue\n\
                   bad zip, $.address.zip ,cid-1,99999\n\
                   ,,,\n\
                   missing county,$.county,,\n";
        let rows = parse_errors_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "bad zip");
        assert_eq!(rows[0].path, "$.address.zip");
        assert_eq!(rows[0].current_value.as_deref(), Some("99999"));
        assert_eq!(rows[1].data_group_cid, None);
    }

    #[test]
    fn accepts_snake_case_headers() {
        let csv = "error_message,error_path\nbroken,$.x\n";
        let rows = parse_errors_csv(csv.as_bytes()).expect("parse");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "broken");
    }

    #[test]
    fn fingerprint_matches_the_domain_formula() {
        let row = ParsedError { message: "bad zip".to_string(),
                                path: "$.address.zip".to_string(),
                                data_group_cid: None,
                                file_path: None,
                                current_value: None };
        assert_eq!(row.fingerprint("palmbeach"),
                   parcel_domain::fingerprint("bad zip", "$.address.zip", "palmbeach"));
    }
}
