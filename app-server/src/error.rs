//! Error types for the server.

use std::path::PathBuf;

use atelier_comfy_client::ComfyError;
use atelier_directory_watcher::WatcherError;
use atelier_ollama::OllamaError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to load .env: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("invalid output settings: {0}")]
    Watcher(#[from] WatcherError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from one generation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("either a prompt or a concept is required")]
    MissingPrompt,

    #[error("prompt expansion failed: {0}")]
    Ollama(#[from] OllamaError),

    #[error("image backend failed: {0}")]
    Comfy(#[from] ComfyError),

    #[error("output watch failed: {0}")]
    Watcher(#[from] WatcherError),

    #[error("generation did not complete in time")]
    TimedOut,

    #[error("generation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingPrompt | Self::Ollama(OllamaError::EmptyConcept) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Ollama(_) | Self::Comfy(_) => StatusCode::BAD_GATEWAY,
            Self::Watcher(_) | Self::TimedOut => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// JSON error body returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::new(err.status(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
        } else {
            warn!("Request rejected ({}): {}", self.status, self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
