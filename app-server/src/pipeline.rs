//! One generation, end to end.
//!
//! ```text
//! concept ──► Ollama ──► prompt ──┐
//!                                 ▼
//!          snapshot ──► ComfyUI dispatch ──► wait for stable file ──► path
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use atelier_comfy_client::{ComfyClient, GenerationRequest, WorkflowTemplate};
use atelier_directory_watcher::{CompletionWatcher, StableFileResult};
use atelier_ollama::OllamaClient;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::error::PipelineError;

/// Sampler steps when the caller gives none.
pub const DEFAULT_STEPS: u32 = 28;

/// Output width and height when the caller gives none.
pub const DEFAULT_SIZE: u32 = 1024;

/// What a caller asks for. Either `prompt` or `concept` must be non-blank;
/// a prompt is used as-is, a concept is expanded first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInput {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl GenerationInput {
    fn to_request(&self, prompt: String) -> GenerationRequest {
        let mut request = GenerationRequest::new(prompt)
            .with_steps(self.steps.unwrap_or(DEFAULT_STEPS))
            .with_size(
                self.width.unwrap_or(DEFAULT_SIZE),
                self.height.unwrap_or(DEFAULT_SIZE),
            );
        if let Some(negative) = non_blank(self.negative_prompt.as_deref()) {
            request = request.with_negative_prompt(negative);
        }
        if let Some(seed) = self.seed {
            request = request.with_seed(seed);
        }
        request
    }
}

/// A finished generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Prompt actually sent to the backend.
    pub prompt: String,

    /// ComfyUI's id for the queued prompt.
    pub prompt_id: String,

    /// Absolute path of the stable output file.
    pub image_path: PathBuf,
}

/// Owns the backend clients and the output watcher.
pub struct GenerationPipeline {
    ollama: OllamaClient,
    comfy: ComfyClient,
    template: WorkflowTemplate,
    watcher: CompletionWatcher,
    // Held from snapshot to stable file so each request claims the output it caused.
    in_flight: Mutex<()>,
}

impl GenerationPipeline {
    pub fn new(
        ollama: OllamaClient,
        comfy: ComfyClient,
        template: WorkflowTemplate,
        watcher: CompletionWatcher,
    ) -> Self {
        Self {
            ollama,
            comfy,
            template,
            watcher,
            in_flight: Mutex::new(()),
        }
    }

    /// Build every collaborator from configuration.
    ///
    /// Fails if the workflow template is invalid or the output directory
    /// cannot be read.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let ollama = OllamaClient::with_timeout(
            &config.ollama.base_url,
            &config.ollama.model,
            Duration::from_secs(config.ollama.timeout_secs),
        )
        .context("failed to build Ollama client")?
        .with_max_tokens(config.ollama.max_tokens);

        let comfy = ComfyClient::new(&config.comfy.base_url);

        let template = WorkflowTemplate::load(&config.comfy.workflow, config.comfy.slots.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load workflow template {}",
                    config.comfy.workflow.display()
                )
            })?;

        let watcher = CompletionWatcher::new(
            config.output.watch_target(),
            config.output.watch_timings(),
        )
        .context("invalid output settings")?;

        let baseline = watcher.snapshot().await.with_context(|| {
            format!(
                "cannot read output directory {}",
                config.output.dir.display()
            )
        })?;
        info!(
            "Watching {} (latest output: {:?})",
            watcher.target().directory.display(),
            baseline.path()
        );

        Ok(Self::new(ollama, comfy, template, watcher))
    }

    /// Directory generated images are served from.
    pub fn output_dir(&self) -> &Path {
        &self.watcher.target().directory
    }

    /// Expand a concept into a full prompt.
    pub async fn expand(&self, concept: &str, style: Option<&str>) -> Result<String, PipelineError> {
        Ok(self.ollama.expand_concept(concept, style).await?)
    }

    /// Pick the prompt for `input`, expanding the concept when no prompt is given.
    pub async fn resolve_prompt(&self, input: &GenerationInput) -> Result<String, PipelineError> {
        if let Some(prompt) = non_blank(input.prompt.as_deref()) {
            return Ok(prompt.to_string());
        }
        match non_blank(input.concept.as_deref()) {
            Some(concept) => self.expand(concept, input.style.as_deref()).await,
            None => Err(PipelineError::MissingPrompt),
        }
    }

    /// Run one generation and wait for its output file.
    pub async fn generate(
        &self,
        input: &GenerationInput,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let prompt = self.resolve_prompt(input).await?;
        let request = input.to_request(prompt.clone());

        let _guard = self.in_flight.lock().await;
        let baseline = self.watcher.snapshot().await?;
        let queued = self.comfy.dispatch(&self.template, &request).await?;

        match self.watcher.wait_with_cancellation(&baseline, cancel).await? {
            Some(StableFileResult::Found(image_path)) => Ok(GenerationOutcome {
                prompt,
                prompt_id: queued.prompt_id,
                image_path,
            }),
            Some(StableFileResult::TimedOut) => Err(PipelineError::TimedOut),
            None => Err(PipelineError::Cancelled),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
