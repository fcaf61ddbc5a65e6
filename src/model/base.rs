use std::{
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    foundation::error::{InklayerError, InklayerResult},
    model::safetensors::open_existing,
};

/// Bytes hashed from the head of a weights file to identify it.
const FINGERPRINT_PREFIX_BYTES: u64 = 1024 * 1024;

/// The weight files one pipeline run renders with.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelSet {
    pub base_model: PathBuf,
    pub structural_adapter: PathBuf,
    /// Style overlay applied during the flat-color stage only.
    pub flat_color_overlay: Option<PathBuf>,
}

impl ModelSet {
    /// Check that every referenced file exists, before anything is allocated.
    pub fn validate(&self) -> InklayerResult<()> {
        require_file(&self.base_model, "base model")?;
        require_file(&self.structural_adapter, "structural adapter")?;
        if let Some(overlay) = &self.flat_color_overlay {
            require_file(overlay, "overlay weights")?;
        }
        Ok(())
    }
}

fn require_file(path: &Path, what: &str) -> InklayerResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(InklayerError::configuration(format!(
            "{what} file not found: '{}'",
            path.display()
        )))
    }
}

/// A base generation model resident on the accelerator for one stage.
#[derive(Clone, Debug)]
pub struct BaseModel {
    pub path: PathBuf,
    /// Accelerator footprint in bytes.
    pub bytes: u64,
    pub fingerprint: u64,
}

impl BaseModel {
    pub fn load(path: &Path) -> InklayerResult<Self> {
        let (bytes, fingerprint) = fingerprint_file(path, "base model")?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            fingerprint,
        })
    }
}

/// Identify a weights file by its length and an xxh3 hash of its head.
///
/// Returns `(file_len, fingerprint)`.
pub fn fingerprint_file(path: &Path, what: &str) -> InklayerResult<(u64, u64)> {
    let f = open_existing(path, what)?;
    let len = f
        .metadata()
        .with_context(|| format!("stat {what} '{}'", path.display()))?
        .len();

    let mut head = Vec::with_capacity(len.min(FINGERPRINT_PREFIX_BYTES) as usize);
    f.take(FINGERPRINT_PREFIX_BYTES)
        .read_to_end(&mut head)
        .with_context(|| format!("read {what} '{}'", path.display()))?;

    let mut hasher = xxhash_rust::xxh3::Xxh3::new();
    hasher.update(&len.to_le_bytes());
    hasher.update(&head);
    Ok((len, hasher.digest()))
}

#[cfg(test)]
#[path = "../../tests/unit/model/base.rs"]
mod tests;
