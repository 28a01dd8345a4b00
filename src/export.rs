//! Dataset persistence.
//!
//! Writes the result store as a pretty-printed JSON array of `{role,
//! content}` objects, overwriting the output file on every save. The bytes
//! are a pure function of the store snapshot, so saving twice with no
//! intervening mutation produces identical files.

use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::store::ResultStore;

/// Writes result-store snapshots to a fixed output path.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    path: PathBuf,
}

impl DatasetWriter {
    /// Creates a writer targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes a consistent snapshot of the store and overwrites the output
    /// file with it.
    pub fn write(&self, store: &ResultStore) -> Result<(), ExportError> {
        let snapshot = store.snapshot();
        let data = serde_json::to_vec_pretty(&snapshot)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}
