//! Codificación de claves compuestas y sort keys de los índices.
//!
//! Contrato:
//! - `pad10(n)` produce un decimal de ancho fijo: el orden lexicográfico de
//!   las sort keys es igual al orden numérico del contador embebido.
//! - `#` es el delimitador; códigos, estatus e identificadores no pueden
//!   contenerlo (se valida en el dominio antes de llegar aquí).
//! - Las sort keys de GSI siempre son re-derivables de los atributos base:
//!   después de cada mutación de contador se reescriben con estas mismas
//!   funciones.

use parcel_domain::ErrorStatus;

use crate::constants::PAD_WIDTH;

/// Decimal con ceros a la izquierda, ancho exacto de 10 dígitos.
pub fn pad10(n: u64) -> String {
    format!("{n:0width$}", width = PAD_WIDTH)
}

/// `EXECUTION#<execId>` (PK y SK de FailedExecution/ExecutionState).
pub fn execution_key(execution_id: &str) -> String {
    format!("EXECUTION#{execution_id}")
}

/// `ERROR#<code>` (PK/SK de ErrorRecord, SK del link, partición GSI1 inversa).
pub fn error_key(code: &str) -> String {
    format!("ERROR#{code}")
}

/// `AGG#COUNTY#<county>#DG#<dg>` (PK de StepAggregate).
pub fn aggregate_pk(county: &str, data_group: &str) -> String {
    format!("AGG#COUNTY#{county}#DG#{data_group}")
}

/// `PHASE#<phase>#STEP#<step>` (SK de StepAggregate).
pub fn aggregate_sk(phase: &str, step: &str) -> String {
    format!("PHASE#{phase}#STEP#{step}")
}

/// GSI1SK de FailedExecution: `COUNT#<pad10(open)>#EXECUTION#<id>`.
pub fn failed_execution_gsi1_sk(open_error_count: u64, execution_id: &str) -> String {
    format!("COUNT#{}#EXECUTION#{}", pad10(open_error_count), execution_id)
}

/// GSI3SK de FailedExecution:
/// `COUNT#<errorType>#<STATUS>#<pad10(open)>#EXECUTION#<id>`.
pub fn failed_execution_gsi3_sk(error_type: &str, status: ErrorStatus, open_error_count: u64, execution_id: &str)
                                -> String {
    format!("COUNT#{}#{}#{}#EXECUTION#{}",
            error_type,
            status.sort_token(),
            pad10(open_error_count),
            execution_id)
}

/// GSI2SK de ErrorRecord: `COUNT#<STATUS>#<pad10(total)>#ERROR#<code>`.
pub fn error_record_gsi2_sk(status: ErrorStatus, total_count: u64, code: &str) -> String {
    format!("COUNT#{}#{}#ERROR#{}", status.sort_token(), pad10(total_count), code)
}

/// GSI3SK de ErrorRecord:
/// `COUNT#<errorType>#<STATUS>#<pad10(total)>#ERROR#<code>`.
pub fn error_record_gsi3_sk(error_type: &str, status: ErrorStatus, total_count: u64, code: &str) -> String {
    format!("COUNT#{}#{}#{}#ERROR#{}", error_type, status.sort_token(), pad10(total_count), code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad10_is_exactly_ten_digits() {
        assert_eq!(pad10(0), "0000000000");
        assert_eq!(pad10(1), "0000000001");
        assert_eq!(pad10(1234567890), "1234567890");
    }

    #[test]
    fn lexicographic_order_equals_numeric_order() {
        // Mismo estatus y mismo errorType → el orden lexicográfico de la
        // sort key sigue el orden numérico del contador.
        let lo = error_record_gsi3_sk("01", ErrorStatus::Failed, 9, "01256");
        let hi = error_record_gsi3_sk("01", ErrorStatus::Failed, 10, "01300");
        assert!(lo < hi);
        let far = error_record_gsi3_sk("01", ErrorStatus::Failed, 1_000_000, "01001");
        assert!(hi < far);
    }

    #[test]
    fn sort_key_shapes_match_contract() {
        assert_eq!(failed_execution_gsi1_sk(1, "E1"), "COUNT#0000000001#EXECUTION#E1");
        assert_eq!(error_record_gsi2_sk(ErrorStatus::Failed, 1, "01256"),
                   "COUNT#FAILED#0000000001#ERROR#01256");
        assert_eq!(error_record_gsi2_sk(ErrorStatus::MaybeSolved, 2, "01256"),
                   "COUNT#MAYBESOLVED#0000000002#ERROR#01256");
        assert_eq!(aggregate_pk("palmbeach", "dg1"), "AGG#COUNTY#palmbeach#DG#dg1");
        assert_eq!(aggregate_sk("prepare", "download"), "PHASE#prepare#STEP#download");
    }
}
