//! The opaque inference capability behind every generation stage.
//!
//! [`Synthesizer`] is the seam a real diffusion runtime plugs into. The built-in
//! [`ProceduralSynthesizer`] honours the same contract (text-to-image, structural guidance,
//! image-to-image with denoise strength, seed determinism) with a seeded noise-field painter, so
//! the layered pipeline runs anywhere without an accelerator.

use image::RgbaImage;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use xxhash_rust::xxh3::Xxh3;

use crate::{
    foundation::error::{InklayerError, InklayerResult},
    generate::request::{RenderRequest, SynthesisMode},
    model::{adapter::StructuralAdapter, base::BaseModel, weights::OverlayWeights},
};

/// Weights resident on the accelerator for the current stage.
#[derive(Clone, Copy, Debug)]
pub struct LoadedModels<'a> {
    pub base: &'a BaseModel,
    pub overlay: Option<&'a OverlayWeights>,
    pub adapter: Option<&'a StructuralAdapter>,
}

/// Everything a synthesizer needs for one image.
#[derive(Clone, Copy, Debug)]
pub struct SynthesisJob<'a> {
    pub request: &'a RenderRequest,
    pub mode: SynthesisMode,
    /// Resolved seed; never absent at this point.
    pub seed: u64,
    pub models: LoadedModels<'a>,
}

pub trait Synthesizer {
    fn name(&self) -> &'static str;

    /// Produce a `request.width x request.height` image. Must be a pure function of `job`.
    fn synthesize(&mut self, job: &SynthesisJob<'_>) -> InklayerResult<RgbaImage>;
}

/// Available synthesizer implementations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SynthesizerKind {
    /// Deterministic CPU painter.
    #[default]
    Procedural,
}

pub fn create_synthesizer(kind: SynthesizerKind) -> InklayerResult<Box<dyn Synthesizer>> {
    match kind {
        SynthesizerKind::Procedural => Ok(Box::new(ProceduralSynthesizer)),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProceduralSynthesizer;

/// Number of tone bands the noise field is quantized into.
const BANDS: usize = 6;
/// Half-width of a contour stroke, in band units.
const STROKE: f32 = 0.08;
/// How much a fully dark guide pixel darkens guided output at strength 1.
const GUIDE_INK: f32 = 0.35;

impl Synthesizer for ProceduralSynthesizer {
    fn name(&self) -> &'static str {
        "procedural"
    }

    fn synthesize(&mut self, job: &SynthesisJob<'_>) -> InklayerResult<RgbaImage> {
        let req = job.request;
        let traits = PromptTraits::parse(&req.prompt);
        let overlay_scale = job.models.overlay.map(|o| o.kind.scale()).unwrap_or(0.0);

        let structure = structure_key(job);
        let style = style_key(job, structure);
        let field = NoiseField::new(structure, req.width, req.height);

        let mut rng = StdRng::seed_from_u64(style);
        let palette = Palette::new(&traits.colors, &mut rng);
        let light = LightRig::new(&mut rng);
        let texture = if traits.flat { 0.0 } else { 0.16 * (1.0 - overlay_scale) };

        let painter = Painter {
            job,
            traits: &traits,
            field: &field,
            palette: &palette,
            light: &light,
            texture,
        };

        let w = req.width as usize;
        let h = req.height as usize;
        let mut data = vec![0u8; w * h * 4];
        data.par_chunks_exact_mut(w * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    px.copy_from_slice(&painter.pixel(x as u32, y as u32));
                }
            });

        RgbaImage::from_raw(req.width, req.height, data)
            .ok_or_else(|| InklayerError::resource("procedural synthesizer produced a short buffer"))
    }
}

/// Geometry depends only on the seed and the base model, so stages that share a seed share a
/// composition.
fn structure_key(job: &SynthesisJob<'_>) -> u64 {
    let mut h = Xxh3::new();
    h.update(&job.models.base.fingerprint.to_le_bytes());
    h.update(&job.seed.to_le_bytes());
    h.update(&job.request.width.to_le_bytes());
    h.update(&job.request.height.to_le_bytes());
    h.digest()
}

fn style_key(job: &SynthesisJob<'_>, structure: u64) -> u64 {
    let req = job.request;
    let mut h = Xxh3::new();
    h.update(&structure.to_le_bytes());
    h.update(req.prompt.as_bytes());
    h.update(&[0xff]);
    h.update(req.negative_prompt.as_deref().unwrap_or("").as_bytes());
    h.update(&[0xff]);
    if let Some(o) = job.models.overlay {
        h.update(&o.fingerprint.to_le_bytes());
    }
    if let Some(a) = job.models.adapter {
        h.update(&a.fingerprint.to_le_bytes());
    }
    h.digest()
}

/// What the painter reads out of a comma-separated tag prompt.
#[derive(Debug, Default, PartialEq)]
struct PromptTraits {
    monochrome: bool,
    flat: bool,
    lit: bool,
    colors: Vec<[f32; 3]>,
}

const NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("red", [200, 40, 45]),
    ("blue", [50, 95, 210]),
    ("green", [60, 160, 85]),
    ("yellow", [235, 205, 60]),
    ("orange", [240, 140, 50]),
    ("pink", [240, 150, 190]),
    ("purple", [140, 80, 180]),
    ("brown", [125, 82, 50]),
    ("black", [30, 30, 36]),
    ("white", [242, 242, 240]),
    ("silver", [190, 195, 205]),
    ("gold", [212, 175, 55]),
];

impl PromptTraits {
    fn parse(prompt: &str) -> Self {
        let mut out = Self::default();
        for tag in prompt.split(',').map(|t| t.trim().to_ascii_lowercase()) {
            if tag.is_empty() {
                continue;
            }
            if tag == "monochrome" || tag == "lineart" {
                out.monochrome = true;
            }
            if tag.starts_with("flat ") {
                out.flat = true;
            }
            let negated = tag.starts_with("no ");
            if !negated && (tag.contains("lighting") || tag.contains("rim light") || tag.contains("shadows")) {
                out.lit = true;
            }
            // "white background" describes the canvas, not the subject.
            if negated || tag.ends_with("background") {
                continue;
            }
            for word in tag.split(|c: char| !c.is_ascii_alphabetic()) {
                if let Some((_, rgb)) = NAMED_COLORS.iter().find(|(name, _)| *name == word) {
                    let c = rgb.map(|v| f32::from(v) / 255.0);
                    if !out.colors.contains(&c) {
                        out.colors.push(c);
                    }
                }
            }
        }
        out
    }
}

struct NoiseField {
    coarse: Grid,
    fine: Grid,
}

struct Grid {
    cols: usize,
    rows: usize,
    cell: f32,
    values: Vec<f32>,
}

impl Grid {
    fn new(rng: &mut StdRng, width: u32, height: u32, cell: f32) -> Self {
        let cols = (width as f32 / cell).ceil() as usize + 2;
        let rows = (height as f32 / cell).ceil() as usize + 2;
        let values = (0..cols * rows).map(|_| rng.random::<f32>()).collect();
        Self {
            cols,
            rows,
            cell,
            values,
        }
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let gx = x / self.cell;
        let gy = y / self.cell;
        let (ix, iy) = (gx.floor() as usize, gy.floor() as usize);
        let (tx, ty) = (smooth(gx.fract()), smooth(gy.fract()));
        // Wraps, so offset lookups tile instead of running off the grid.
        let at = |cx: usize, cy: usize| self.values[(cy % self.rows) * self.cols + cx % self.cols];
        let top = lerp(at(ix, iy), at(ix + 1, iy), tx);
        let bottom = lerp(at(ix, iy + 1), at(ix + 1, iy + 1), tx);
        lerp(top, bottom, ty)
    }
}

impl NoiseField {
    fn new(key: u64, width: u32, height: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(key);
        let cell = (width.max(height) as f32 / 5.0).max(1.0);
        Self {
            coarse: Grid::new(&mut rng, width, height, cell),
            fine: Grid::new(&mut rng, width, height, (cell / 3.0).max(1.0)),
        }
    }

    /// Structural value in `[0, 1)`.
    fn shape(&self, x: f32, y: f32) -> f32 {
        ((self.coarse.sample(x, y) + 0.3 * self.fine.sample(x, y)) / 1.3).clamp(0.0, 0.9999)
    }

    fn detail(&self, x: f32, y: f32) -> f32 {
        self.fine.sample(x * 2.0 + 7.0, y * 2.0 + 3.0)
    }
}

struct Palette {
    colors: Vec<[f32; 3]>,
}

impl Palette {
    fn new(named: &[[f32; 3]], rng: &mut StdRng) -> Self {
        let mut colors: Vec<[f32; 3]> = named.iter().take(BANDS).copied().collect();
        while colors.len() < BANDS {
            let hue = rng.random_range(0.0..360.0);
            let sat = rng.random_range(0.25..0.7);
            let val = rng.random_range(0.55..0.95);
            colors.push(hsv_to_rgb(hue, sat, val));
        }
        Self { colors }
    }

    fn band(&self, i: usize) -> [f32; 3] {
        self.colors[i % self.colors.len()]
    }
}

struct LightRig {
    dir: (f32, f32),
}

impl LightRig {
    fn new(rng: &mut StdRng) -> Self {
        let angle: f32 = rng.random_range(0.0..std::f32::consts::TAU);
        Self {
            dir: (angle.cos(), angle.sin()),
        }
    }

    fn apply(&self, c: [f32; 3], u: f32, v: f32, edge: f32) -> [f32; 3] {
        let t = (u - 0.5) * self.dir.0 + (v - 0.5) * self.dir.1;
        let shade = 0.72 + 0.5 * t;
        let rim = if t > 0.0 && edge < 0.1 { 0.3 * t } else { 0.0 };
        c.map(|ch| ch * shade + rim)
    }
}

struct Painter<'a> {
    job: &'a SynthesisJob<'a>,
    traits: &'a PromptTraits,
    field: &'a NoiseField,
    palette: &'a Palette,
    light: &'a LightRig,
    texture: f32,
}

impl Painter<'_> {
    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let req = self.job.request;
        let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
        let level = self.field.shape(fx, fy) * BANDS as f32;
        let edge = (level - level.round()).abs();

        let mut rgb = if self.traits.monochrome {
            let ink = (1.0 - edge / STROKE).clamp(0.0, 1.0);
            [1.0 - ink; 3]
        } else {
            let base = self.palette.band(level as usize);
            let grain = 1.0 - self.texture / 2.0 + self.texture * self.field.detail(fx, fy);
            let mut c = base.map(|ch| ch * grain);
            if self.traits.lit {
                let u = fx / req.width as f32;
                let v = fy / req.height as f32;
                c = self.light.apply(c, u, v, edge);
            }
            c
        };

        if self.job.mode.is_guided()
            && let Some(guide) = &req.guide_image
        {
            let ink = 1.0 - luminance(guide.get_pixel(x, y).0);
            let k = 1.0 - GUIDE_INK * req.guide_strength * ink;
            rgb = rgb.map(|ch| ch * k);
        }

        if self.job.mode.refines()
            && let Some(start) = &req.starting_image
        {
            let s = start.get_pixel(x, y).0;
            let d = req.denoise_strength;
            for (i, ch) in rgb.iter_mut().enumerate() {
                *ch = f32::from(s[i]) / 255.0 * (1.0 - d) + *ch * d;
            }
        }

        let [r, g, b] = rgb.map(|ch| (ch.clamp(0.0, 1.0) * 255.0).round() as u8);
        [r, g, b, 255]
    }
}

/// Relative luminance of an RGBA8 pixel in `[0, 1]`, ignoring alpha.
fn luminance(px: [u8; 4]) -> f32 {
    (0.2126 * f32::from(px[0]) + 0.7152 * f32::from(px[1]) + 0.0722 * f32::from(px[2])) / 255.0
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn smooth(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let c = v * s;
    let hp = (h / 60.0) % 6.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [r + m, g + m, b + m]
}

#[cfg(test)]
#[path = "../../tests/unit/generate/synth.rs"]
mod tests;
