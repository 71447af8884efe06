//! Ollama `/api/generate` client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{OllamaError, Result};

/// Default Ollama address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model used for prompt expansion.
pub const DEFAULT_MODEL: &str = "deepseek-r1:1.5b";

/// Default per-request timeout. Small local models can still be slow on CPU.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Model options. Ollama names the token cap `num_predict`.
#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

/// Only the fields we read. Some community builds answer with `text`
/// instead of `response`.
#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        [self.response, self.text]
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
    }
}

/// Build the instruction sent to the model for `concept`.
pub fn expansion_instruction(concept: &str, style_hint: Option<&str>) -> String {
    let mut instruction = format!(
        "Create a detailed, evocative image prompt for a text-to-image model. Concept: {}.",
        concept.trim()
    );
    if let Some(style) = style_hint.map(str::trim).filter(|s| !s.is_empty()) {
        instruction.push_str(&format!(" Add stylistic modifiers: {style}."));
    }
    instruction
}

/// Client for one Ollama server and model.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a client with the default request timeout.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            client,
        })
    }

    /// Cap the number of tokens each completion may generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Expand a short concept into a detailed image prompt.
    pub async fn expand_concept(&self, concept: &str, style_hint: Option<&str>) -> Result<String> {
        if concept.trim().is_empty() {
            return Err(OllamaError::EmptyConcept);
        }

        let prompt = self.generate(&expansion_instruction(concept, style_hint)).await?;
        info!("Expanded concept into {} character prompt", prompt.len());
        Ok(prompt)
    }

    /// Run one non-streaming completion and return its trimmed text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Generating with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    num_predict: self.max_tokens,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OllamaError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: GenerateResponse = response.json().await?;
        result.into_text().ok_or(OllamaError::EmptyResponse)
    }
}
