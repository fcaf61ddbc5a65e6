//! Style overlay weights: low-rank adaptation (LoRA) or a learned token embedding.
//!
//! Files do not declare which of the two they are. Loading tries [`OverlayFormat::LowRank`]
//! first and falls through to [`OverlayFormat::Embedding`] only when the first attempt reports a
//! structural format mismatch. Missing files and corrupt containers fail immediately.

use std::path::{Path, PathBuf};

use crate::{
    foundation::error::{InklayerError, InklayerResult},
    model::{
        base::fingerprint_file,
        safetensors::{self, SafetensorsHeader},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayFormat {
    LowRank,
    Embedding,
}

impl OverlayFormat {
    /// Formats in the order loading attempts them.
    pub const ATTEMPT_ORDER: [OverlayFormat; 2] = [OverlayFormat::LowRank, OverlayFormat::Embedding];

    pub fn name(self) -> &'static str {
        match self {
            OverlayFormat::LowRank => "low-rank adaptation",
            OverlayFormat::Embedding => "learned embedding",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverlayKind {
    LowRank {
        rank: usize,
        alpha: f32,
        /// Number of adapted layers (down/up projection pairs).
        layers: usize,
    },
    Embedding {
        token: String,
        vectors: usize,
        dim: usize,
    },
}

impl OverlayKind {
    pub fn format(&self) -> OverlayFormat {
        match self {
            OverlayKind::LowRank { .. } => OverlayFormat::LowRank,
            OverlayKind::Embedding { .. } => OverlayFormat::Embedding,
        }
    }

    /// Effective influence on the base model, in `[0, 1]`.
    pub fn scale(&self) -> f32 {
        match self {
            OverlayKind::LowRank { rank, alpha, .. } => (alpha / *rank as f32).clamp(0.0, 1.0),
            OverlayKind::Embedding { .. } => 1.0,
        }
    }
}

/// Overlay weights loaded for one stage.
#[derive(Clone, Debug)]
pub struct OverlayWeights {
    pub path: PathBuf,
    /// Accelerator footprint in bytes.
    pub bytes: u64,
    pub fingerprint: u64,
    pub kind: OverlayKind,
    /// Number of format attempts it took to load (1 or 2).
    pub attempts: usize,
}

/// Outcome of a single-format load attempt that did not succeed.
#[derive(Debug)]
enum AttemptError {
    /// The container is fine but holds the other format. Eligible for retry.
    WrongFormat(String),
    /// Anything else: missing file, corrupt container, I/O.
    Fatal(InklayerError),
}

impl From<InklayerError> for AttemptError {
    fn from(e: InklayerError) -> Self {
        Self::Fatal(e)
    }
}

impl OverlayWeights {
    #[tracing::instrument(level = "debug", fields(path = %path.display()))]
    pub fn load(path: &Path) -> InklayerResult<Self> {
        let mut rejected = Vec::new();

        for (i, format) in OverlayFormat::ATTEMPT_ORDER.into_iter().enumerate() {
            match load_as(path, format) {
                Ok(kind) => {
                    if i > 0 {
                        tracing::info!(
                            format = format.name(),
                            "overlay weights loaded on retry"
                        );
                    }
                    let (bytes, fingerprint) = fingerprint_file(path, "overlay weights")?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                        bytes,
                        fingerprint,
                        kind,
                        attempts: i + 1,
                    });
                }
                Err(AttemptError::WrongFormat(why)) => {
                    tracing::debug!(format = format.name(), %why, "overlay format mismatch");
                    rejected.push(format!("not {}: {why}", format.name()));
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }

        Err(InklayerError::weight_format(format!(
            "overlay weights '{}' are unreadable ({})",
            path.display(),
            rejected.join("; ")
        )))
    }
}

fn load_as(path: &Path, format: OverlayFormat) -> Result<OverlayKind, AttemptError> {
    let header = safetensors::read_header(path)?;
    match format {
        OverlayFormat::LowRank => interpret_low_rank(&header),
        OverlayFormat::Embedding => interpret_embedding(&header, path),
    }
}

const LORA_PAIRS: [(&str, &str); 2] = [
    (".lora_down.weight", ".lora_up.weight"),
    (".lora_A.weight", ".lora_B.weight"),
];

fn interpret_low_rank(header: &SafetensorsHeader) -> Result<OverlayKind, AttemptError> {
    let mut layers = 0usize;
    let mut rank = None;

    for (name, info) in &header.tensors {
        let Some((prefix, up_suffix)) = LORA_PAIRS
            .iter()
            .find_map(|(down, up)| name.strip_suffix(down).map(|p| (p, *up)))
        else {
            continue;
        };
        if header.tensor(&format!("{prefix}{up_suffix}")).is_none() {
            return Err(AttemptError::WrongFormat(format!(
                "down projection '{name}' has no matching up projection"
            )));
        }
        let r = info.shape.first().copied().unwrap_or(0);
        if r == 0 {
            return Err(AttemptError::WrongFormat(format!(
                "down projection '{name}' has zero rank"
            )));
        }
        match rank {
            None => rank = Some(r),
            Some(prev) if prev != r => {
                return Err(AttemptError::WrongFormat(format!(
                    "inconsistent ranks {prev} and {r}"
                )));
            }
            Some(_) => {}
        }
        layers += 1;
    }

    let Some(rank) = rank else {
        return Err(AttemptError::WrongFormat(
            "no lora down/up projection pairs".to_string(),
        ));
    };
    let alpha = header
        .metadata
        .get("ss_network_alpha")
        .and_then(|a| a.parse::<f32>().ok())
        .unwrap_or(rank as f32);

    Ok(OverlayKind::LowRank {
        rank,
        alpha,
        layers,
    })
}

fn is_embedding_key(name: &str) -> bool {
    name == "emb_params" || name == "clip_l" || name == "clip_g" || name.starts_with("string_to_param.")
}

fn interpret_embedding(
    header: &SafetensorsHeader,
    path: &Path,
) -> Result<OverlayKind, AttemptError> {
    if header.tensors.is_empty() {
        return Err(AttemptError::WrongFormat("no tensors".to_string()));
    }
    if let Some(other) = header.tensors.keys().find(|k| !is_embedding_key(k)) {
        return Err(AttemptError::WrongFormat(format!(
            "unexpected tensor '{other}' in embedding file"
        )));
    }

    let (name, info) = header
        .tensors
        .iter()
        .next()
        .ok_or_else(|| AttemptError::WrongFormat("no tensors".to_string()))?;
    let (vectors, dim) = match info.shape.as_slice() {
        [dim] => (1, *dim),
        [n, dim] => (*n, *dim),
        other => {
            return Err(AttemptError::WrongFormat(format!(
                "embedding '{name}' has unsupported shape {other:?}"
            )));
        }
    };
    if vectors == 0 || dim == 0 {
        return Err(AttemptError::WrongFormat(format!(
            "embedding '{name}' is empty"
        )));
    }

    let token = header.metadata.get("name").cloned().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "embedding".to_string())
    });

    Ok(OverlayKind::Embedding {
        token,
        vectors,
        dim,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/model/weights.rs"]
mod tests;
