use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use inklayer::{
    InklayerError, LayeredPipeline, ModelSet, PipelineConfig, PromptExpander, Settings,
    SynthesizerKind,
};

#[derive(Parser, Debug)]
#[command(name = "inklayer", version)]
struct Cli {
    /// Free-text description of the illustration.
    prompt: String,

    /// Directory that receives one timestamped session directory per run.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Fixed seed for reproducible layers.
    #[arg(long)]
    seed: Option<u64>,

    /// Render width [default: 1024].
    #[arg(long)]
    width: Option<u32>,

    /// Render height [default: 1024].
    #[arg(long)]
    height: Option<u32>,

    /// Prompt-expansion model id (used only when OPENROUTER_API_KEY is set).
    #[arg(long, default_value = inklayer::DEFAULT_EXPANDER_MODEL)]
    model: String,

    /// Report the layer paths without rendering.
    #[arg(long)]
    dry_run: bool,

    /// Base generation model weights.
    #[arg(long)]
    base_model: Option<PathBuf>,

    /// Structural adapter weights (safetensors).
    #[arg(long)]
    adapter: Option<PathBuf>,

    /// Overlay weights for the flat-color stage (low-rank or embedding safetensors).
    #[arg(long)]
    flat_overlay: Option<PathBuf>,

    /// Pipeline config JSON; command-line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Synthesizer backend.
    #[arg(long, value_enum, default_value_t = SynthChoice::Procedural)]
    synthesizer: SynthChoice,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SynthChoice {
    Procedural,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = build_settings(&cli)?;

    let session_dir = inklayer::session::create_session_dir(&cli.output_dir, chrono::Utc::now())?;
    tracing::info!(dir = %session_dir.display(), "session started");

    let expander = inklayer::optional_expander(&settings.expander);
    let prompts = inklayer::build_prompt_bundle(
        &cli.prompt,
        expander.as_ref().map(|e| e as &dyn PromptExpander),
    );
    inklayer::session::write_json(
        &session_dir.join(inklayer::session::SESSION_RECORD),
        &prompts,
    )?;

    let outputs = if cli.dry_run {
        inklayer::plan(&session_dir)
    } else {
        let models = model_set(&cli)?;
        let synth = inklayer::create_synthesizer(match cli.synthesizer {
            SynthChoice::Procedural => SynthesizerKind::Procedural,
        })?;
        let mut pipeline = LayeredPipeline::with_synthesizer(settings.pipeline, models, synth)?;
        pipeline.run(&prompts, &session_dir, false)?
    };

    inklayer::session::write_json(
        &session_dir.join(inklayer::session::MANIFEST_RECORD),
        &outputs,
    )?;
    let summary = serde_json::json!({
        "session_dir": session_dir,
        "outputs": outputs,
    });
    println!("{}", serde_json::to_string(&summary).context("encode run summary")?);
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Settings are resolved once here: config file, then flags, then environment.
fn build_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut pipeline = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(w) = cli.width {
        pipeline.width = w;
    }
    if let Some(h) = cli.height {
        pipeline.height = h;
    }
    if cli.seed.is_some() {
        pipeline.seed = cli.seed;
    }
    pipeline.validate()?;

    let mut settings = Settings {
        pipeline,
        ..Settings::default()
    };
    settings.expander.model = cli.model.clone();
    settings.expander.api_key = std::env::var("OPENROUTER_API_KEY").ok();
    if let Ok(url) = std::env::var("OPENROUTER_BASE_URL") {
        settings.expander.base_url = url;
    }
    Ok(settings)
}

fn model_set(cli: &Cli) -> Result<ModelSet, InklayerError> {
    let base_model = cli
        .base_model
        .clone()
        .ok_or_else(|| InklayerError::configuration("--base-model is required unless --dry-run"))?;
    let structural_adapter = cli
        .adapter
        .clone()
        .ok_or_else(|| InklayerError::configuration("--adapter is required unless --dry-run"))?;
    Ok(ModelSet {
        base_model,
        structural_adapter,
        flat_color_overlay: cli.flat_overlay.clone(),
    })
}
