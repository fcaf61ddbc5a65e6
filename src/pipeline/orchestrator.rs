use std::path::Path;

use crate::{
    composite::compositor::Compositor,
    device::pool::AcceleratorPool,
    foundation::{
        config::PipelineConfig,
        error::{InklayerError, InklayerResult, Stage},
    },
    generate::{
        request::{RenderRequest, StageResult},
        runner::{StageModels, StageRunner},
        synth::{Synthesizer, SynthesizerKind, create_synthesizer},
    },
    model::base::ModelSet,
    pipeline::outputs::PipelineOutputs,
    prompt::PromptBundle,
};

/// Where a pipeline is in its run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(Stage),
    Compositing,
    Done,
    Failed,
}

impl PipelineState {
    /// Stages only move forward; any state may fail, and finished pipelines may start over.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (_, Failed) => true,
            (Idle | Done | Failed, Running(Stage::Outline)) => true,
            (Running(Stage::Outline), Running(Stage::FlatColor)) => true,
            (Running(Stage::FlatColor), Running(Stage::Shading)) => true,
            (Running(Stage::Shading), Compositing | Done) => true,
            (Compositing, Done) => true,
            _ => false,
        }
    }
}

/// Layer paths for `dir` without rendering anything or touching the filesystem.
pub fn plan(dir: &Path) -> PipelineOutputs {
    PipelineOutputs::for_dir(dir)
}

/// Drives the outline, flat-color and shading stages in order, then composites them.
///
/// Each stage loads its own weights from `models` and hands the accelerator pool back empty
/// before the next one starts. A failing stage moves the pipeline to [`PipelineState::Failed`]
/// and the remaining stages are skipped.
pub struct LayeredPipeline {
    config: PipelineConfig,
    models: ModelSet,
    pool: AcceleratorPool,
    synthesizer: Box<dyn Synthesizer>,
    state: PipelineState,
}

impl LayeredPipeline {
    pub fn new(config: PipelineConfig, models: ModelSet) -> InklayerResult<Self> {
        Self::with_synthesizer(
            config,
            models,
            create_synthesizer(SynthesizerKind::default())?,
        )
    }

    pub fn with_synthesizer(
        config: PipelineConfig,
        models: ModelSet,
        synthesizer: Box<dyn Synthesizer>,
    ) -> InklayerResult<Self> {
        config.validate()?;
        let pool = AcceleratorPool::new(config.device_budget_bytes);
        Ok(Self {
            config,
            models,
            pool,
            synthesizer,
            state: PipelineState::Idle,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn pool(&self) -> &AcceleratorPool {
        &self.pool
    }

    /// Full run: the three stages plus the final composite. `dry_run` only reports the paths.
    #[tracing::instrument(skip(self, prompts, dir), fields(dir = %dir.display()))]
    pub fn run(
        &mut self,
        prompts: &PromptBundle,
        dir: &Path,
        dry_run: bool,
    ) -> InklayerResult<PipelineOutputs> {
        if dry_run {
            tracing::info!("dry run, nothing rendered");
            return Ok(plan(dir));
        }

        let outputs = self.render_stages(prompts, dir)?;
        self.advance(PipelineState::Compositing)?;
        let compositor = Compositor::new(self.config.flatten_background);
        if let Err(e) = compositor.compose_files(&outputs) {
            self.state = PipelineState::Failed;
            return Err(e);
        }
        self.advance(PipelineState::Done)?;
        Ok(outputs)
    }

    /// Render and persist the three stage layers without compositing them.
    pub fn render_layers(
        &mut self,
        prompts: &PromptBundle,
        dir: &Path,
    ) -> InklayerResult<PipelineOutputs> {
        let outputs = self.render_stages(prompts, dir)?;
        self.advance(PipelineState::Done)?;
        Ok(outputs)
    }

    fn render_stages(
        &mut self,
        prompts: &PromptBundle,
        dir: &Path,
    ) -> InklayerResult<PipelineOutputs> {
        if let Err(e) = self.models.validate() {
            self.state = PipelineState::Failed;
            return Err(e);
        }
        let models = self.models.clone();
        let outputs = plan(dir);
        let cfg = self.config.clone();
        // One seed for the whole run keeps the three layers on the same composition.
        let seed = cfg.seed.unwrap_or_else(|| {
            let fresh = rand::random::<u64>();
            tracing::info!(seed = fresh, "no seed configured, drew one for this run");
            fresh
        });

        let outline = self.run_stage(
            Stage::Outline,
            &RenderRequest::new(&prompts.lineart, cfg.width, cfg.height)
                .with_negative(&prompts.negative)
                .with_seed(Some(seed)),
            StageModels::base(&models.base_model),
            &outputs.lineart,
        )?;

        let flat = self.run_stage(
            Stage::FlatColor,
            &RenderRequest::new(&prompts.flat_color, cfg.width, cfg.height)
                .with_negative(&prompts.negative)
                .with_seed(Some(seed))
                .with_guide(outline.image.clone(), cfg.guide_strength),
            StageModels::base(&models.base_model)
                .with_overlay(models.flat_color_overlay.as_deref())
                .with_adapter(&models.structural_adapter),
            &outputs.flat_color,
        )?;

        self.run_stage(
            Stage::Shading,
            &RenderRequest::new(&prompts.shading, cfg.width, cfg.height)
                .with_negative(&prompts.negative)
                .with_seed(Some(seed))
                .with_starting_image(flat.image.clone(), cfg.shading_denoise)
                .with_guide(outline.image.clone(), cfg.guide_strength),
            StageModels::base(&models.base_model).with_adapter(&models.structural_adapter),
            &outputs.shading,
        )?;

        Ok(outputs)
    }

    fn run_stage(
        &mut self,
        stage: Stage,
        request: &RenderRequest,
        models: StageModels<'_>,
        out_path: &Path,
    ) -> InklayerResult<StageResult> {
        self.advance(PipelineState::Running(stage))?;
        tracing::info!(%stage, "stage started");

        let mut runner = StageRunner::new(&mut self.pool, self.synthesizer.as_mut());
        match runner.render(request, models, out_path) {
            Ok(result) => {
                let stats = self.pool.stats();
                tracing::info!(
                    %stage,
                    path = %result.saved_path.display(),
                    peak_bytes = stats.peak_bytes,
                    "stage finished"
                );
                Ok(result)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                tracing::warn!(%stage, error = %e, "stage failed, later stages skipped");
                Err(e.in_stage(stage))
            }
        }
    }

    fn advance(&mut self, next: PipelineState) -> InklayerResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(InklayerError::validation(format!(
                "pipeline cannot move from {:?} to {next:?}",
                self.state
            )));
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/orchestrator.rs"]
mod tests;
