//! Prompt bundle construction: per-stage tag sets wrapped in fixed stage templates.

pub mod expander;
pub mod templates;

use crate::foundation::error::{InklayerError, InklayerResult};

/// Stage-specific tag sets, as returned by an expander.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TagBundle {
    pub lineart_tags: String,
    pub flat_color_tags: String,
    pub shading_tags: String,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TagField {
    Text(String),
    List(Vec<String>),
}

impl TagField {
    fn into_text(self) -> String {
        match self {
            TagField::Text(s) => s.trim().to_string(),
            TagField::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(serde::Deserialize)]
struct RawTagBundle {
    lineart_tags: TagField,
    flat_color_tags: TagField,
    shading_tags: TagField,
}

impl TagBundle {
    /// Every stage gets the same text.
    pub fn uniform(text: &str) -> Self {
        Self {
            lineart_tags: text.to_string(),
            flat_color_tags: text.to_string(),
            shading_tags: text.to_string(),
        }
    }

    /// Parse an expander reply. Tag sets may be strings or string arrays; a surrounding
    /// markdown code fence is tolerated.
    pub fn from_json(content: &str) -> InklayerResult<Self> {
        let body = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let raw: RawTagBundle = serde_json::from_str(body)
            .map_err(|e| InklayerError::collaborator(format!("malformed tag bundle: {e}")))?;
        let bundle = Self {
            lineart_tags: raw.lineart_tags.into_text(),
            flat_color_tags: raw.flat_color_tags.into_text(),
            shading_tags: raw.shading_tags.into_text(),
        };
        if bundle.lineart_tags.is_empty()
            || bundle.flat_color_tags.is_empty()
            || bundle.shading_tags.is_empty()
        {
            return Err(InklayerError::collaborator("tag bundle has an empty tag set"));
        }
        Ok(bundle)
    }
}

/// The resolved prompts of one run. Recorded verbatim in `session.json`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PromptBundle {
    pub lineart: String,
    pub flat_color: String,
    pub shading: String,
    pub negative: String,
    /// Human-readable description the stage prompts were built from.
    pub refined: String,
}

impl PromptBundle {
    pub fn from_tags(tags: &TagBundle) -> Self {
        let refined = if tags.lineart_tags == tags.flat_color_tags
            && tags.flat_color_tags == tags.shading_tags
        {
            tags.lineart_tags.clone()
        } else {
            format!(
                "lineart: {}; flat color: {}; shading: {}",
                tags.lineart_tags, tags.flat_color_tags, tags.shading_tags
            )
        };
        Self {
            lineart: templates::lineart_prompt(&tags.lineart_tags),
            flat_color: templates::flat_color_prompt(&tags.flat_color_tags),
            shading: templates::shading_prompt(&tags.shading_tags),
            negative: templates::NEGATIVE_PROMPT.to_string(),
            refined,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/prompt/bundle.rs"]
mod tests;
