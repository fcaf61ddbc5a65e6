use std::path::{Path, PathBuf};

use crate::foundation::error::Stage;

pub const LINEART_FILE: &str = "01_lineart.png";
pub const FLAT_COLOR_FILE: &str = "02_flat_color.png";
pub const SHADING_FILE: &str = "03_shading_light.png";
pub const FINAL_FILE: &str = "04_final_composite.png";

/// Where each layer of a run lives. Known before anything renders, so dry runs can report it.
///
/// Serializes as the run manifest (`lineart`, `flat_color`, `shading`, `final`).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PipelineOutputs {
    pub lineart: PathBuf,
    pub flat_color: PathBuf,
    pub shading: PathBuf,
    #[serde(rename = "final")]
    pub final_composite: PathBuf,
}

impl PipelineOutputs {
    pub fn for_dir(dir: &Path) -> Self {
        Self {
            lineart: dir.join(LINEART_FILE),
            flat_color: dir.join(FLAT_COLOR_FILE),
            shading: dir.join(SHADING_FILE),
            final_composite: dir.join(FINAL_FILE),
        }
    }

    /// The layer file written by `stage`.
    pub fn stage_path(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Outline => &self.lineart,
            Stage::FlatColor => &self.flat_color,
            Stage::Shading => &self.shading,
        }
    }

    /// All four paths in write order.
    pub fn paths(&self) -> [&Path; 4] {
        [
            self.lineart.as_path(),
            self.flat_color.as_path(),
            self.shading.as_path(),
            self.final_composite.as_path(),
        ]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/outputs.rs"]
mod tests;
