//! HTTP and command-line front end for concept-to-image generation.
//!
//! A request flows through [`pipeline::GenerationPipeline`]: the concept is
//! expanded by Ollama, the workflow is queued on ComfyUI, and the directory
//! watcher waits for the finished image, which is then served under
//! `/outputs`.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod server;

pub use config::AppConfig;
pub use error::{ApiError, ConfigError, PipelineError};
pub use pipeline::{GenerationInput, GenerationOutcome, GenerationPipeline};
pub use routes::{AppState, router};
pub use server::serve;
