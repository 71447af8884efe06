//! # Ollama
//!
//! Turns a short concept into a detailed text-to-image prompt using a local
//! Ollama model.

pub mod client;
pub mod error;

pub use client::{
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, OllamaClient, expansion_instruction,
};
pub use error::{OllamaError, Result};
