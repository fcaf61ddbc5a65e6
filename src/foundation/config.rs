use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context as _;

use crate::foundation::error::{InklayerError, InklayerResult};

/// Default accelerator budget: room for one SD1.5-class stage working set.
pub const DEFAULT_DEVICE_BUDGET_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Default chat-completion endpoint for prompt expansion.
pub const DEFAULT_EXPANDER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default prompt-expansion model identifier.
pub const DEFAULT_EXPANDER_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Tunables of one layered pipeline run.
///
/// Can be loaded from JSON; every field is optional there and falls back to [`Default`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Render width shared by every stage.
    pub width: u32,
    /// Render height shared by every stage.
    pub height: u32,
    /// Fixed seed for reproducible runs; `None` draws fresh entropy per stage.
    pub seed: Option<u64>,
    /// How strongly the structural adapter follows the outline layer.
    pub guide_strength: f32,
    /// Fraction of the flat-color layer regenerated by the shading stage.
    pub shading_denoise: f32,
    /// Accelerator memory budget in bytes.
    pub device_budget_bytes: u64,
    /// Background used to flatten any residual alpha in the final composite.
    pub flatten_background: [u8; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            seed: None,
            guide_strength: 1.0,
            shading_denoise: 0.6,
            device_budget_bytes: DEFAULT_DEVICE_BUDGET_BYTES,
            flatten_background: [255, 255, 255],
        }
    }
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> InklayerResult<Self> {
        let f = File::open(path)
            .with_context(|| format!("open pipeline config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> InklayerResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(InklayerError::configuration(
                "render width/height must be non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.guide_strength) {
            return Err(InklayerError::configuration(format!(
                "guide_strength must be in [0, 1], got {}",
                self.guide_strength
            )));
        }
        if !(0.0..=1.0).contains(&self.shading_denoise) {
            return Err(InklayerError::configuration(format!(
                "shading_denoise must be in [0, 1], got {}",
                self.shading_denoise
            )));
        }
        if self.device_budget_bytes == 0 {
            return Err(InklayerError::configuration(
                "device_budget_bytes must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Settings for the remote prompt expander.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpanderConfig {
    /// Expansion is skipped entirely when no key is configured.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_EXPANDER_BASE_URL.to_string(),
            model: DEFAULT_EXPANDER_MODEL.to_string(),
        }
    }
}

/// Process-wide settings, built once at entry and passed down by reference.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub expander: ExpanderConfig,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
