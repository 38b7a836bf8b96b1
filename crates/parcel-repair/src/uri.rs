//! URIs de object store (`s3://bucket/key`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RepairError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), key: key.into() }
    }

    /// Parsea `s3://bucket/key/...`; bucket y key no pueden quedar vacíos.
    pub fn parse(uri: &str) -> Result<Self, RepairError> {
        let rest = uri.strip_prefix("s3://")
                      .ok_or_else(|| RepairError::Validation(format!("not an object uri: {uri}")))?;
        let (bucket, key) = rest.split_once('/')
                                .ok_or_else(|| RepairError::Validation(format!("object uri lacks key: {uri}")))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(RepairError::Validation(format!("object uri lacks bucket or key: {uri}")));
        }
        Ok(Self { bucket: bucket.to_string(), key: key.to_string() })
    }

    /// Último segmento de la key (nombre de archivo).
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// URI hermana dentro del mismo prefijo (reemplaza el nombre final).
    pub fn sibling(&self, file_name: &str) -> Self {
        match self.key.rsplit_once('/') {
            Some((prefix, _)) => Self::new(self.bucket.clone(), format!("{prefix}/{file_name}")),
            None => Self::new(self.bucket.clone(), file_name.to_string()),
        }
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
