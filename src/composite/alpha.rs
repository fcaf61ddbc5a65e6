use image::{Rgba, RgbaImage};

/// Turn an outline raster into a transparent ink layer.
///
/// Luminance is inverted into alpha (`255 - L`) over solid black: white paper becomes fully
/// transparent, black strokes fully opaque, grays proportionally translucent. The input's own
/// alpha channel is ignored.
pub fn extract_line_alpha(outline: &RgbaImage) -> RgbaImage {
    let luma = image::imageops::grayscale(outline);
    RgbaImage::from_fn(outline.width(), outline.height(), |x, y| {
        let l = luma.get_pixel(x, y).0[0];
        Rgba([0, 0, 0, 255 - l])
    })
}

#[cfg(test)]
#[path = "../../tests/unit/composite/alpha.rs"]
mod tests;
