//! Parameters for one image generation.

use serde::{Deserialize, Serialize};

/// Negative prompt used when the caller gives none.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, distorted, low quality";

/// Seed used when the caller gives none.
pub const DEFAULT_SEED: u64 = 42;

/// What to render. Optional fields are only written into the workflow when
/// the template binds a slot for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Positive prompt text.
    pub prompt: String,

    /// Negative prompt text.
    pub negative_prompt: String,

    /// Sampler seed.
    pub seed: u64,

    /// Sampler steps.
    pub steps: Option<u32>,

    /// Output width in pixels.
    pub width: Option<u32>,

    /// Output height in pixels.
    pub height: Option<u32>,
}

impl GenerationRequest {
    /// Create a request with the default negative prompt and seed.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            seed: DEFAULT_SEED,
            steps: None,
            width: None,
            height: None,
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Set the output size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}
