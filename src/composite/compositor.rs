use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::{RgbImage, RgbaImage};

use crate::{
    composite::{
        alpha::extract_line_alpha,
        blend::{flatten_premul_to_rgb8, over_in_place, premultiply_rgba8_in_place},
    },
    foundation::error::{InklayerError, InklayerResult},
    pipeline::outputs::PipelineOutputs,
};

/// The three stage rasters the compositor reads.
#[derive(Clone, Copy, Debug)]
pub struct LayerImages<'a> {
    pub lineart: &'a RgbaImage,
    pub flat_color: &'a RgbaImage,
    pub shading: &'a RgbaImage,
}

/// Fuses the stage layers into the final illustration.
///
/// The shading layer is the base and the alpha-extracted lineart is drawn over it. The flat-color
/// layer is size-checked but not blended: the shading stage was refined from it and already
/// carries its palette.
#[derive(Clone, Copy, Debug)]
pub struct Compositor {
    /// Fills whatever transparency remains after blending.
    pub background: [u8; 3],
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            background: [255, 255, 255],
        }
    }
}

impl Compositor {
    pub fn new(background: [u8; 3]) -> Self {
        Self { background }
    }

    pub fn compose(&self, layers: LayerImages<'_>) -> InklayerResult<RgbImage> {
        let dims = layers.shading.dimensions();
        for (name, img) in [
            ("lineart", layers.lineart),
            ("flat_color", layers.flat_color),
        ] {
            if img.dimensions() != dims {
                return Err(InklayerError::compositing(format!(
                    "layer '{name}' is {}x{} but shading is {}x{}",
                    img.width(),
                    img.height(),
                    dims.0,
                    dims.1
                )));
            }
        }

        // Black ink: straight and premultiplied bytes coincide.
        let ink = extract_line_alpha(layers.lineart);
        let mut canvas = layers.shading.as_raw().clone();
        premultiply_rgba8_in_place(&mut canvas);
        over_in_place(&mut canvas, ink.as_raw())?;

        let rgb = flatten_premul_to_rgb8(&canvas, self.background)?;
        RgbImage::from_raw(dims.0, dims.1, rgb)
            .ok_or_else(|| InklayerError::compositing("flattened buffer has the wrong length"))
    }

    /// Read the persisted stage layers, compose them and write `outputs.final_composite`.
    ///
    /// Nothing is written unless every layer loads and the sizes agree. The file is staged next
    /// to its destination and renamed into place.
    #[tracing::instrument(skip(self, outputs), fields(out = %outputs.final_composite.display()))]
    pub fn compose_files(&self, outputs: &PipelineOutputs) -> InklayerResult<PathBuf> {
        let lineart = load_layer(&outputs.lineart, "lineart")?;
        let flat_color = load_layer(&outputs.flat_color, "flat_color")?;
        let shading = load_layer(&outputs.shading, "shading")?;

        let composite = self.compose(LayerImages {
            lineart: &lineart,
            flat_color: &flat_color,
            shading: &shading,
        })?;

        write_atomically(&composite, &outputs.final_composite)?;
        tracing::info!("final composite written");
        Ok(outputs.final_composite.clone())
    }
}

fn load_layer(path: &Path, name: &str) -> InklayerResult<RgbaImage> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| {
            InklayerError::compositing(format!(
                "unreadable {name} layer '{}': {e}",
                path.display()
            ))
        })
}

fn write_atomically(img: &RgbImage, dest: &Path) -> InklayerResult<()> {
    let staging = dest.with_extension("png.partial");
    let written = img
        .save_with_format(&staging, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", staging.display()))
        .and_then(|()| {
            std::fs::rename(&staging, dest)
                .with_context(|| format!("move composite into '{}'", dest.display()))
        });
    if written.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    Ok(written?)
}

#[cfg(test)]
#[path = "../../tests/unit/composite/compositor.rs"]
mod tests;
