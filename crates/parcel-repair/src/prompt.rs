//! Prompt del agente como asset versionado.
//!
//! El texto vive en `repair_prompt.txt` (dato, no código) con parámetros
//! nombrados `{{param}}`; el render falla si queda algún parámetro sin
//! resolver, para que un typo en el template no llegue al agente.

use crate::error::RepairError;

/// Versión lógica del prompt; cambia cuando cambia el texto del asset.
pub const PROMPT_VERSION: &str = "repair-v1";

const REPAIR_PROMPT: &str = include_str!("repair_prompt.txt");

pub struct PromptTemplate {
    template: &'static str,
    pub version: &'static str,
}

impl PromptTemplate {
    /// Template de reparación de scripts por defecto.
    pub fn repair_default() -> Self {
        Self { template: REPAIR_PROMPT, version: PROMPT_VERSION }
    }

    /// Rinde el template con parámetros nombrados.
    pub fn render(&self, params: &[(&str, String)]) -> Result<String, RepairError> {
        let mut rendered = self.template.to_string();
        for (name, value) in params {
            rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
        }
        if let Some(start) = rendered.find("{{") {
            let tail: String = rendered[start..].chars().take(40).collect();
            return Err(RepairError::Validation(format!("unresolved prompt parameter near: {tail}")));
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_every_parameter() {
        let prompt = PromptTemplate::repair_default();
        let rendered = prompt.render(&[("county", "palmbeach".to_string()),
                                       ("error_count", "3".to_string()),
                                       ("error_table", "| bad zip | $.address.zip |".to_string())])
                             .expect("render");
        assert!(rendered.contains("palmbeach"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn unresolved_parameters_are_an_error() {
        let prompt = PromptTemplate::repair_default();
        assert!(prompt.render(&[("county", "palmbeach".to_string())]).is_err());
    }
}
