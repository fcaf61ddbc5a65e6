use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use image::RgbaImage;

use super::*;
use crate::{
    generate::{
        request::SynthesisMode,
        synth::{ProceduralSynthesizer, SynthesisJob},
    },
    prompt::{TagBundle, expander::build_prompt_bundle},
};

fn write_container(path: &Path, header: &str) {
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    std::fs::write(path, bytes).unwrap();
}

fn model_set(dir: &Path) -> ModelSet {
    std::fs::write(dir.join("base.ckpt"), vec![3u8; 2048]).unwrap();
    write_container(
        &dir.join("adapter.safetensors"),
        r#"{"cond.weight":{"dtype":"F16","shape":[4],"data_offsets":[0,0]}}"#,
    );
    ModelSet {
        base_model: dir.join("base.ckpt"),
        structural_adapter: dir.join("adapter.safetensors"),
        flat_color_overlay: None,
    }
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        width: 24,
        height: 16,
        seed: Some(11),
        device_budget_bytes: 1024 * 1024,
        ..PipelineConfig::default()
    }
}

fn prompts() -> PromptBundle {
    build_prompt_bundle("a girl with blue hair standing in rain", None)
}

/// Fails on the `n`th synthesis call (1-based) and paints procedurally otherwise.
struct FailOnCall {
    n: usize,
    calls: usize,
}

impl Synthesizer for FailOnCall {
    fn name(&self) -> &'static str {
        "fail-on-call"
    }

    fn synthesize(&mut self, job: &SynthesisJob<'_>) -> InklayerResult<RgbaImage> {
        self.calls += 1;
        if self.calls == self.n {
            return Err(InklayerError::resource("device lost"));
        }
        ProceduralSynthesizer.synthesize(job)
    }
}

#[test]
fn stages_only_move_forward() {
    use PipelineState::*;
    assert!(Idle.can_advance_to(Running(Stage::Outline)));
    assert!(Running(Stage::Outline).can_advance_to(Running(Stage::FlatColor)));
    assert!(Running(Stage::FlatColor).can_advance_to(Running(Stage::Shading)));
    assert!(Running(Stage::Shading).can_advance_to(Compositing));
    assert!(Compositing.can_advance_to(Done));
    assert!(Running(Stage::FlatColor).can_advance_to(Failed));

    assert!(!Idle.can_advance_to(Running(Stage::FlatColor)));
    assert!(!Running(Stage::Outline).can_advance_to(Running(Stage::Shading)));
    assert!(!Running(Stage::Shading).can_advance_to(Running(Stage::FlatColor)));
    assert!(!Running(Stage::FlatColor).can_advance_to(Done));
    assert!(!Done.can_advance_to(Compositing));
}

#[test]
fn dry_run_touches_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let session = tmp.path().join("session");
    let models = ModelSet {
        base_model: PathBuf::from("missing.ckpt"),
        structural_adapter: PathBuf::from("missing.safetensors"),
        flat_color_overlay: None,
    };
    let mut pipeline = LayeredPipeline::new(small_config(), models).unwrap();

    let outputs = pipeline.run(&prompts(), &session, true).unwrap();
    assert_eq!(outputs, PipelineOutputs::for_dir(&session));
    assert!(!session.exists());
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.pool().stats().allocations, 0);
}

#[test]
fn full_run_writes_every_layer_and_finishes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pipeline = LayeredPipeline::new(small_config(), model_set(tmp.path())).unwrap();
    let dir = tmp.path().join("run");

    let outputs = pipeline.run(&prompts(), &dir, false).unwrap();
    for path in outputs.paths() {
        assert!(path.is_file(), "{} missing", path.display());
    }
    assert_eq!(pipeline.state(), PipelineState::Done);

    let final_img = image::open(&outputs.final_composite).unwrap();
    assert_eq!((final_img.width(), final_img.height()), (24, 16));
    assert_eq!(final_img.color(), image::ColorType::Rgb8);

    let st = pipeline.pool().stats();
    assert_eq!(st.reclaims, 3);
    assert_eq!(st.in_use_bytes, 0);
    assert_eq!(st.cached_bytes, 0);
}

#[test]
fn render_layers_skips_the_composite() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pipeline = LayeredPipeline::new(small_config(), model_set(tmp.path())).unwrap();
    let outputs = pipeline.render_layers(&prompts(), tmp.path()).unwrap();

    assert!(outputs.shading.is_file());
    assert!(!outputs.final_composite.exists());
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[test]
fn failing_stage_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pipeline = LayeredPipeline::with_synthesizer(
        small_config(),
        model_set(tmp.path()),
        Box::new(FailOnCall { n: 2, calls: 0 }),
    )
    .unwrap();

    let err = pipeline.run(&prompts(), tmp.path(), false).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::FlatColor));
    assert!(matches!(err.root(), InklayerError::Resource(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);

    let outputs = PipelineOutputs::for_dir(tmp.path());
    assert!(outputs.lineart.is_file());
    assert!(!outputs.flat_color.exists());
    assert!(!outputs.shading.exists());
    assert!(!outputs.final_composite.exists());

    let st = pipeline.pool().stats();
    assert_eq!(st.reclaims, 2);
    assert_eq!(st.in_use_bytes, 0);
}

#[test]
fn missing_models_fail_before_any_allocation() {
    let tmp = tempfile::tempdir().unwrap();
    let mut models = model_set(tmp.path());
    models.structural_adapter = tmp.path().join("nope.safetensors");
    let mut pipeline = LayeredPipeline::new(small_config(), models).unwrap();

    let err = pipeline.run(&prompts(), tmp.path(), false).unwrap_err();
    assert!(matches!(err, InklayerError::Configuration(_)));
    assert!(err.to_string().contains("structural adapter"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(pipeline.pool().stats().allocations, 0);
    assert!(!PipelineOutputs::for_dir(tmp.path()).lineart.exists());
}

#[test]
fn failed_pipeline_can_run_again() {
    let tmp = tempfile::tempdir().unwrap();
    let mut pipeline = LayeredPipeline::with_synthesizer(
        small_config(),
        model_set(tmp.path()),
        Box::new(FailOnCall { n: 1, calls: 0 }),
    )
    .unwrap();
    let tags = TagBundle::uniform("rain");
    let bundle = PromptBundle::from_tags(&tags);

    assert!(pipeline.run(&bundle, tmp.path(), false).is_err());
    pipeline.run(&bundle, tmp.path(), false).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        shading_denoise: 1.5,
        ..small_config()
    };
    let err = LayeredPipeline::new(cfg, model_set(tmp.path())).err().unwrap();
    assert!(matches!(err, InklayerError::Configuration(_)));
}

fn with_lora_overlay(dir: &Path) -> ModelSet {
    write_container(
        &dir.join("flat_lora.safetensors"),
        r#"{"unet.q.lora_down.weight":{"dtype":"F16","shape":[4,320],"data_offsets":[0,0]},
            "unet.q.lora_up.weight":{"dtype":"F16","shape":[320,4],"data_offsets":[0,0]}}"#,
    );
    ModelSet {
        flat_color_overlay: Some(dir.join("flat_lora.safetensors")),
        ..model_set(dir)
    }
}

/// What one synthesis call was conditioned on, plus what it produced.
#[derive(Clone, Debug)]
struct SeenJob {
    mode: SynthesisMode,
    seed: u64,
    guide: Option<RgbaImage>,
    start: Option<RgbaImage>,
    guide_strength: f32,
    denoise_strength: f32,
    overlay: bool,
    adapter: bool,
    output: RgbaImage,
}

struct Recording {
    seen: Arc<Mutex<Vec<SeenJob>>>,
}

impl Synthesizer for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn synthesize(&mut self, job: &SynthesisJob<'_>) -> InklayerResult<RgbaImage> {
        let output = ProceduralSynthesizer.synthesize(job)?;
        let req = job.request;
        self.seen.lock().unwrap().push(SeenJob {
            mode: job.mode,
            seed: job.seed,
            guide: req.guide_image.as_deref().cloned(),
            start: req.starting_image.as_deref().cloned(),
            guide_strength: req.guide_strength,
            denoise_strength: req.denoise_strength,
            overlay: job.models.overlay.is_some(),
            adapter: job.models.adapter.is_some(),
            output: output.clone(),
        });
        Ok(output)
    }
}

fn record_run(config: PipelineConfig, models: ModelSet, dir: &Path) -> Vec<SeenJob> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = LayeredPipeline::with_synthesizer(
        config,
        models,
        Box::new(Recording { seen: seen.clone() }),
    )
    .unwrap();
    pipeline.run(&prompts(), dir, false).unwrap();
    let jobs = seen.lock().unwrap().clone();
    jobs
}

#[test]
fn each_stage_is_conditioned_on_the_previous_layers() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        seed: None,
        ..small_config()
    };
    let jobs = record_run(cfg, with_lora_overlay(tmp.path()), tmp.path());
    assert_eq!(jobs.len(), 3);
    let [outline, flat, shading] = [&jobs[0], &jobs[1], &jobs[2]];

    assert_eq!(outline.mode, SynthesisMode::TextToImage);
    assert!(outline.guide.is_none());
    assert!(outline.start.is_none());
    assert!(!outline.overlay);
    assert!(!outline.adapter);

    assert_eq!(flat.mode, SynthesisMode::GuidedTextToImage);
    assert_eq!(flat.guide.as_ref(), Some(&outline.output));
    assert!(flat.start.is_none());
    assert_eq!(flat.guide_strength, 1.0);
    assert!(flat.overlay);
    assert!(flat.adapter);

    assert_eq!(shading.mode, SynthesisMode::GuidedImageToImage);
    assert_eq!(shading.start.as_ref(), Some(&flat.output));
    assert_eq!(shading.guide.as_ref(), Some(&outline.output));
    assert_eq!(shading.guide_strength, 1.0);
    assert_eq!(shading.denoise_strength, 0.6);
    assert!(!shading.overlay);
    assert!(shading.adapter);

    let outputs = PipelineOutputs::for_dir(tmp.path());
    assert_eq!(image::open(&outputs.lineart).unwrap().to_rgba8(), outline.output);
    assert_eq!(image::open(&outputs.flat_color).unwrap().to_rgba8(), flat.output);
}

#[test]
fn unseeded_run_shares_one_seed_across_stages() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        seed: None,
        ..small_config()
    };
    let jobs = record_run(cfg, model_set(tmp.path()), tmp.path());
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0].seed, jobs[1].seed);
    assert_eq!(jobs[1].seed, jobs[2].seed);
}

#[test]
fn configured_strengths_reach_the_stages() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        guide_strength: 0.5,
        shading_denoise: 0.25,
        ..small_config()
    };
    let jobs = record_run(cfg, model_set(tmp.path()), tmp.path());
    assert_eq!(jobs[1].guide_strength, 0.5);
    assert_eq!(jobs[2].guide_strength, 0.5);
    assert_eq!(jobs[2].denoise_strength, 0.25);
    assert!(jobs.iter().all(|j| j.seed == 11));
}
