use std::{path::PathBuf, sync::Arc};

use image::RgbaImage;

use crate::foundation::error::{InklayerError, InklayerResult};

/// Input of one generation stage.
///
/// Images are shared (`Arc`) because one stage output feeds more than one later stage.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    /// `None` draws fresh entropy; the run is then not reproducible.
    pub seed: Option<u64>,
    /// Image-to-image source. Enables refinement instead of synthesis from noise.
    pub starting_image: Option<Arc<RgbaImage>>,
    /// Structural reference consumed by the conditioning adapter.
    pub guide_image: Option<Arc<RgbaImage>>,
    pub guide_strength: f32,
    /// Only meaningful with a `starting_image`: 0 keeps it, 1 regenerates it entirely.
    pub denoise_strength: f32,
}

impl RenderRequest {
    pub fn new(prompt: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            width,
            height,
            seed: None,
            starting_image: None,
            guide_image: None,
            guide_strength: 1.0,
            denoise_strength: 1.0,
        }
    }

    pub fn with_negative(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_guide(mut self, guide: Arc<RgbaImage>, strength: f32) -> Self {
        self.guide_image = Some(guide);
        self.guide_strength = strength;
        self
    }

    pub fn with_starting_image(mut self, start: Arc<RgbaImage>, denoise: f32) -> Self {
        self.starting_image = Some(start);
        self.denoise_strength = denoise;
        self
    }

    pub fn validate(&self) -> InklayerResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(InklayerError::validation(
                "render width/height must be non-zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.guide_strength) {
            return Err(InklayerError::validation(format!(
                "guide_strength must be in [0, 1], got {}",
                self.guide_strength
            )));
        }
        if !(0.0..=1.0).contains(&self.denoise_strength) {
            return Err(InklayerError::validation(format!(
                "denoise_strength must be in [0, 1], got {}",
                self.denoise_strength
            )));
        }
        for (what, img) in [
            ("starting image", &self.starting_image),
            ("guide image", &self.guide_image),
        ] {
            if let Some(img) = img
                && img.dimensions() != (self.width, self.height)
            {
                return Err(InklayerError::validation(format!(
                    "{what} is {}x{}, request is {}x{}",
                    img.width(),
                    img.height(),
                    self.width,
                    self.height
                )));
            }
        }
        Ok(())
    }
}

/// How a stage turns its request into pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesisMode {
    TextToImage,
    /// Text-to-image following the guide through the structural adapter.
    GuidedTextToImage,
    ImageToImage,
    /// Image-to-image refinement that also follows the guide.
    GuidedImageToImage,
}

impl SynthesisMode {
    /// Pick the mode for `request`, given whether a structural adapter is loaded.
    pub fn select(request: &RenderRequest, has_adapter: bool) -> InklayerResult<Self> {
        if has_adapter && request.guide_image.is_none() {
            return Err(InklayerError::configuration(
                "a structural adapter was supplied without a guide image",
            ));
        }
        Ok(match (request.starting_image.is_some(), has_adapter) {
            (false, false) => SynthesisMode::TextToImage,
            (false, true) => SynthesisMode::GuidedTextToImage,
            (true, false) => SynthesisMode::ImageToImage,
            (true, true) => SynthesisMode::GuidedImageToImage,
        })
    }

    pub fn is_guided(self) -> bool {
        matches!(
            self,
            SynthesisMode::GuidedTextToImage | SynthesisMode::GuidedImageToImage
        )
    }

    pub fn refines(self) -> bool {
        matches!(
            self,
            SynthesisMode::ImageToImage | SynthesisMode::GuidedImageToImage
        )
    }
}

/// One persisted stage output. Never mutated after creation.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub image: Arc<RgbaImage>,
    pub saved_path: PathBuf,
}

#[cfg(test)]
#[path = "../../tests/unit/generate/request.rs"]
mod tests;
