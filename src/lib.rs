//! inklayer renders an illustration as three conditioned layers and fuses them into one image.
//!
//! A run goes through:
//!
//! - Build a [`PromptBundle`] for the outline, flat-color and shading stages
//! - Drive a [`LayeredPipeline`]: each stage loads its weights, renders, persists its layer and
//!   hands the [`AcceleratorPool`] back empty
//! - Composite the alpha-extracted outline over the shading layer with the [`Compositor`]
#![forbid(unsafe_code)]

/// Alpha extraction and layer compositing.
pub mod composite;
/// Accelerator memory accounting.
pub mod device;
mod foundation;
/// Single-stage rendering and the synthesizer seam.
pub mod generate;
/// Weight containers: base model, structural adapter, overlay weights.
pub mod model;
/// Stage sequencing and persisted layer layout.
pub mod pipeline;
/// Stage prompts and optional remote expansion.
pub mod prompt;
/// Session directories and JSON records.
pub mod session;

pub use crate::foundation::config::{
    DEFAULT_DEVICE_BUDGET_BYTES, DEFAULT_EXPANDER_BASE_URL, DEFAULT_EXPANDER_MODEL, ExpanderConfig,
    PipelineConfig, Settings,
};
pub use crate::foundation::error::{InklayerError, InklayerResult, Stage};

pub use crate::composite::compositor::{Compositor, LayerImages};
pub use crate::device::pool::{AcceleratorPool, PoolStats};
pub use crate::generate::request::{RenderRequest, StageResult};
pub use crate::generate::runner::{StageModels, StageRunner};
pub use crate::generate::synth::{Synthesizer, SynthesizerKind, create_synthesizer};
pub use crate::model::base::ModelSet;
pub use crate::model::weights::{OverlayFormat, OverlayWeights};
pub use crate::pipeline::orchestrator::{LayeredPipeline, PipelineState, plan};
pub use crate::pipeline::outputs::PipelineOutputs;
pub use crate::prompt::expander::{
    ChatExpander, PromptExpander, build_prompt_bundle, optional_expander,
};
pub use crate::prompt::{PromptBundle, TagBundle};
