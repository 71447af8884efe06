//! Error types for the Ollama client.

use thiserror::Error;

/// Result type alias for Ollama operations.
pub type Result<T> = std::result::Result<T, OllamaError>;

/// Errors that can occur while expanding a prompt.
#[derive(Error, Debug)]
pub enum OllamaError {
    /// Nothing to expand.
    #[error("concept is empty")]
    EmptyConcept,

    /// Ollama answered with a non-success status.
    #[error("Ollama request failed ({status}): {body}")]
    Api { status: u16, body: String },

    /// Ollama answered but produced no text.
    #[error("Ollama returned an empty response")]
    EmptyResponse,

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
