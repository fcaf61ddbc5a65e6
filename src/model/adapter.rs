use std::path::{Path, PathBuf};

use crate::{
    foundation::error::{InklayerError, InklayerResult},
    model::{base::fingerprint_file, safetensors},
};

/// A structural conditioning adapter (lineart/edge guided), loaded for one stage.
#[derive(Clone, Debug)]
pub struct StructuralAdapter {
    pub path: PathBuf,
    /// Accelerator footprint in bytes.
    pub bytes: u64,
    pub fingerprint: u64,
    pub tensor_count: usize,
    /// Kind of guide the adapter was trained on (`lineart`, `canny`, ...), from its metadata.
    pub control_hint: Option<String>,
}

impl StructuralAdapter {
    #[tracing::instrument(level = "debug", fields(path = %path.display()))]
    pub fn load(path: &Path) -> InklayerResult<Self> {
        let header = safetensors::read_header(path)?;
        if header.tensors.is_empty() {
            return Err(InklayerError::weight_format(format!(
                "structural adapter '{}' contains no tensors",
                path.display()
            )));
        }
        let (bytes, fingerprint) = fingerprint_file(path, "structural adapter")?;

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            fingerprint,
            tensor_count: header.tensors.len(),
            control_hint: header.metadata.get("control_type").cloned(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/model/adapter.rs"]
mod tests;
