use std::{path::Path, sync::Arc};

use anyhow::Context as _;

use crate::{
    device::pool::{AcceleratorPool, AllocationId},
    foundation::error::{InklayerError, InklayerResult},
    generate::{
        request::{RenderRequest, StageResult, SynthesisMode},
        synth::{LoadedModels, SynthesisJob, Synthesizer},
    },
    model::{adapter::StructuralAdapter, base::BaseModel, weights::OverlayWeights},
};

/// Per-pixel working memory a stage reserves on top of its weights (latents, activations).
const WORKSPACE_BYTES_PER_PIXEL: u64 = 16;

/// Weight files one stage renders with.
#[derive(Clone, Copy, Debug)]
pub struct StageModels<'a> {
    pub base: &'a Path,
    pub overlay: Option<&'a Path>,
    pub adapter: Option<&'a Path>,
}

impl<'a> StageModels<'a> {
    pub fn base(base: &'a Path) -> Self {
        Self {
            base,
            overlay: None,
            adapter: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Option<&'a Path>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_adapter(mut self, adapter: &'a Path) -> Self {
        self.adapter = Some(adapter);
        self
    }
}

/// Accelerator allocations held by one stage.
///
/// Dropping the guard releases every allocation and runs a reclaim pass, on success and on
/// every error path alike.
struct StageResources<'p> {
    pool: &'p mut AcceleratorPool,
    held: Vec<AllocationId>,
}

impl<'p> StageResources<'p> {
    fn acquire(pool: &'p mut AcceleratorPool) -> Self {
        Self {
            pool,
            held: Vec::new(),
        }
    }

    fn reserve(&mut self, label: &str, bytes: u64) -> InklayerResult<()> {
        let id = self.pool.allocate(label, bytes)?;
        self.held.push(id);
        Ok(())
    }

    fn load_base(&mut self, path: &Path) -> InklayerResult<BaseModel> {
        let model = BaseModel::load(path)?;
        self.reserve("base model", model.bytes)?;
        Ok(model)
    }

    fn load_overlay(&mut self, path: &Path) -> InklayerResult<OverlayWeights> {
        let overlay = OverlayWeights::load(path)?;
        self.reserve("overlay weights", overlay.bytes)?;
        Ok(overlay)
    }

    fn load_adapter(&mut self, path: &Path) -> InklayerResult<StructuralAdapter> {
        let adapter = StructuralAdapter::load(path)?;
        self.reserve("structural adapter", adapter.bytes)?;
        Ok(adapter)
    }
}

impl Drop for StageResources<'_> {
    fn drop(&mut self) {
        for id in self.held.drain(..).rev() {
            self.pool.release(id);
        }
        let freed = self.pool.reclaim();
        tracing::debug!(freed_bytes = freed, "stage resources released");
    }
}

/// Runs single generation stages against a shared accelerator pool.
pub struct StageRunner<'a> {
    pool: &'a mut AcceleratorPool,
    synthesizer: &'a mut dyn Synthesizer,
}

impl<'a> StageRunner<'a> {
    pub fn new(pool: &'a mut AcceleratorPool, synthesizer: &'a mut dyn Synthesizer) -> Self {
        Self { pool, synthesizer }
    }

    pub fn pool(&self) -> &AcceleratorPool {
        &*self.pool
    }

    /// Render `request` with `models` and persist the result to `out_path` as PNG.
    ///
    /// All weights are loaded for this call only and released before it returns.
    #[tracing::instrument(
        skip(self, request, models, out_path),
        fields(out = %out_path.display(), w = request.width, h = request.height)
    )]
    pub fn render(
        &mut self,
        request: &RenderRequest,
        models: StageModels<'_>,
        out_path: &Path,
    ) -> InklayerResult<StageResult> {
        request.validate()?;
        let mode = SynthesisMode::select(request, models.adapter.is_some())?;
        let seed = request.seed.unwrap_or_else(|| {
            let fresh = rand::random::<u64>();
            tracing::info!(seed = fresh, "no seed given, drew a fresh one");
            fresh
        });

        let image = {
            let mut res = StageResources::acquire(self.pool);
            let base = res.load_base(models.base)?;
            let overlay = models.overlay.map(|p| res.load_overlay(p)).transpose()?;
            let adapter = models.adapter.map(|p| res.load_adapter(p)).transpose()?;
            let pixels = u64::from(request.width) * u64::from(request.height);
            res.reserve("workspace", pixels.saturating_mul(WORKSPACE_BYTES_PER_PIXEL))?;

            let job = SynthesisJob {
                request,
                mode,
                seed,
                models: LoadedModels {
                    base: &base,
                    overlay: overlay.as_ref(),
                    adapter: adapter.as_ref(),
                },
            };
            tracing::info!(
                synthesizer = self.synthesizer.name(),
                ?mode,
                seed,
                overlay = ?overlay.as_ref().map(|o| o.kind.format()),
                "synthesizing"
            );
            self.synthesizer.synthesize(&job).map_err(|e| match e {
                InklayerError::Resource(_) => e,
                other => InklayerError::resource(format!("inference failed: {other}")),
            })?
        };

        if image.dimensions() != (request.width, request.height) {
            return Err(InklayerError::resource(format!(
                "synthesizer returned {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                request.width,
                request.height
            )));
        }

        save_png(&image, out_path)?;
        Ok(StageResult {
            image: Arc::new(image),
            saved_path: out_path.to_path_buf(),
        })
    }
}

pub(crate) fn save_png(image: &image::RgbaImage, path: &Path) -> InklayerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/generate/runner.rs"]
mod tests;
