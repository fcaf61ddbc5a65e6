use std::fmt;

/// Crate-wide result alias.
pub type InklayerResult<T> = Result<T, InklayerError>;

/// Pipeline stage names, used to attribute errors and to drive the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Structural line-art pass.
    Outline,
    /// Flat base-color pass, guided by the outline.
    FlatColor,
    /// Lighting/shadow refinement over the flat-color layer.
    Shading,
}

impl Stage {
    /// Stages in execution order.
    pub const ORDER: [Stage; 3] = [Stage::Outline, Stage::FlatColor, Stage::Shading];

    /// Stable lowercase name, used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Outline => "outline",
            Stage::FlatColor => "flat_color",
            Stage::Shading => "shading",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InklayerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("weight format error: {0}")]
    WeightFormat(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("compositing error: {0}")]
    Compositing(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<InklayerError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InklayerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn weight_format(msg: impl Into<String>) -> Self {
        Self::WeightFormat(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    pub fn compositing(msg: impl Into<String>) -> Self {
        Self::Compositing(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Attribute `self` to a pipeline stage. Already-attributed errors are left alone.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was raised in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost error with stage attribution stripped.
    pub fn root(&self) -> &InklayerError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for InklayerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
