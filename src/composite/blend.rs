//! Integer RGBA8 blending primitives. All math rounds half away from zero via `mul_div255`.

use rayon::prelude::*;

use crate::foundation::error::{InklayerError, InklayerResult};

pub type PremulRgba8 = [u8; 4];

/// Source-over for premultiplied pixels: `out = src + dst * (1 - src_a)`.
///
/// For an opaque `dst` this is `src_rgb * a + dst_rgb * (1 - a)` in straight-alpha terms, and the
/// resulting alpha is `1 - (1 - src_a)(1 - dst_a)`.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8]) -> InklayerResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(InklayerError::compositing(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    dst.par_chunks_exact_mut(4)
        .zip(src.par_chunks_exact(4))
        .for_each(|(d, s)| {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
            d.copy_from_slice(&out);
        });
    Ok(())
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = mul_div255(u16::from(px[0]), a);
        px[1] = mul_div255(u16::from(px[1]), a);
        px[2] = mul_div255(u16::from(px[2]), a);
    }
}

/// Flatten premultiplied RGBA8 over an opaque background into tightly packed RGB8.
pub fn flatten_premul_to_rgb8(src: &[u8], bg_rgb: [u8; 3]) -> InklayerResult<Vec<u8>> {
    if !src.len().is_multiple_of(4) {
        return Err(InklayerError::compositing(
            "flatten expects an rgba8 buffer",
        ));
    }
    let mut out = Vec::with_capacity(src.len() / 4 * 3);
    for s in src.chunks_exact(4) {
        let inv = 255u16 - u16::from(s[3]);
        for i in 0..3 {
            out.push(s[i].saturating_add(mul_div255(u16::from(bg_rgb[i]), inv)));
        }
    }
    Ok(out)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/composite/blend.rs"]
mod tests;
