use std::time::Duration;

use crate::{
    foundation::{
        config::ExpanderConfig,
        error::{InklayerError, InklayerResult},
    },
    prompt::{PromptBundle, TagBundle},
};

const SYSTEM_PROMPT: &str = "You are an expert illustration prompt engineer for anime-style \
diffusion models. Split the user's description into three comma-separated tag sets: \
lineart_tags (subject, pose, composition and outline details only, no colors), \
flat_color_tags (subject plus base colors of hair, eyes, clothing and background, no lighting), \
shading_tags (subject plus lighting, shadows, atmosphere and mood). \
Reply with a single JSON object with exactly the keys lineart_tags, flat_color_tags and \
shading_tags.";

const TEMPERATURE: f32 = 0.7;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns free text into stage-specific tag sets.
pub trait PromptExpander {
    fn expand(&self, text: &str) -> InklayerResult<TagBundle>;
}

/// Build the prompt bundle for `text`.
///
/// Expansion failures never propagate: the raw text is used for every stage and a warning is
/// logged.
pub fn build_prompt_bundle(text: &str, expander: Option<&dyn PromptExpander>) -> PromptBundle {
    let tags = match expander {
        None => TagBundle::uniform(text),
        Some(expander) => match expander.expand(text) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(error = %e, "prompt expansion failed, using raw text");
                TagBundle::uniform(text)
            }
        },
    };
    PromptBundle::from_tags(&tags)
}

/// The configured chat expander, or `None` when there is no key or it cannot be set up.
///
/// Setup failures are logged and the run continues on raw text.
pub fn optional_expander(cfg: &ExpanderConfig) -> Option<ChatExpander> {
    match ChatExpander::from_config(cfg) {
        Ok(expander) => expander,
        Err(e) => {
            tracing::warn!(error = %e, "prompt expander unavailable, using raw text");
            None
        }
    }
}

/// Expander backed by an OpenAI-compatible chat-completion endpoint.
pub struct ChatExpander {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(serde::Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatExpander {
    /// `None` when no API key is configured.
    pub fn from_config(cfg: &ExpanderConfig) -> InklayerResult<Option<Self>> {
        let Some(api_key) = cfg.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        reqwest::Url::parse(&cfg.base_url).map_err(|e| {
            InklayerError::configuration(format!("expander base url '{}': {e}", cfg.base_url))
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InklayerError::configuration(format!("http client: {e}")))?;
        Ok(Some(Self::with_client(client, cfg, api_key)))
    }

    pub(crate) fn with_client(
        client: reqwest::blocking::Client,
        cfg: &ExpanderConfig,
        api_key: &str,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PromptExpander for ChatExpander {
    #[tracing::instrument(skip(self, text), fields(model = %self.model))]
    fn expand(&self, text: &str) -> InklayerResult<TagBundle> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let reply: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| InklayerError::collaborator(format!("chat completion: {e}")))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InklayerError::collaborator("chat completion returned no content"))?;
        tracing::debug!(chars = content.len(), "expander replied");
        TagBundle::from_json(&content)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/prompt/expander.rs"]
mod tests;
