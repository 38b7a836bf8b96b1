//! Fingerprint estable de errores entre ejecuciones.
//!
//! `fingerprint(message, path, county)` = SHA-256 en hex minúsculas de
//! `message + "#" + path + "#" + county`, sin normalización de espacios.
//! Dos ejecuciones distintas que reportan el mismo hash contienen "el mismo"
//! error; el mutador de estatus usa esa igualdad para propagar
//! `maybeSolved` en bloque.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DomainError;

/// Hash de fingerprint validado (64 caracteres hex minúsculas).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(DomainError::ValidationError(format!("not a sha-256 hex fingerprint: {s}")));
        }
        Ok(Fingerprint(s.to_string()))
    }
}

/// Calcula el fingerprint de un error concreto.
pub fn fingerprint(message: &str, path: &str, county: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(b"#");
    hasher.update(path.as_bytes());
    hasher.update(b"#");
    hasher.update(county.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}
