//! Directorio de trabajo temporal por iteración.
//!
//! Adquisición con liberación garantizada: el directorio se borra en el
//! `Drop`, cubra el camino que cubra la iteración (commit, rollback o
//! error). Los errores de limpieza se registran y no se propagan.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use uuid::Uuid;

use crate::error::RepairError;

pub struct TempWorkdir {
    path: PathBuf,
}

impl TempWorkdir {
    /// Crea un directorio único bajo el temp del sistema.
    pub fn create(tag: &str) -> Result<Self, RepairError> {
        let path = std::env::temp_dir().join(format!("parcel-repair-{tag}-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|e| RepairError::Workspace(format!("create {path:?}: {e}")))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Escribe un archivo dentro del workdir y devuelve su ruta.
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, RepairError> {
        let target = self.path.join(file_name);
        fs::write(&target, bytes).map_err(|e| RepairError::Workspace(format!("write {target:?}: {e}")))?;
        Ok(target)
    }
}

impl Drop for TempWorkdir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            // Error de limpieza: se registra, no se propaga.
            warn!("workdir cleanup failed path={:?} err={e}", self.path);
        }
    }
}
