//! # ComfyUI Client
//!
//! Fills a ComfyUI workflow template with one request's prompt, negative
//! prompt and seed, then queues it on the server.
//!
//! ## Features
//!
//! - **Validated Slots**: every role is bound to a named node input, checked
//!   against the graph when the template loads
//! - **Explicit Client**: no shared session; callers own a [`ComfyClient`]
//! - **Fire and Forget**: [`ComfyClient::dispatch`] returns on acceptance;
//!   finding the output file is the directory watcher's job

pub mod client;
pub mod error;
pub mod request;
pub mod workflow;

pub use client::{ComfyClient, QueuedPrompt};
pub use error::{ComfyError, Result};
pub use request::{DEFAULT_NEGATIVE_PROMPT, DEFAULT_SEED, GenerationRequest};
pub use workflow::{Role, SlotBinding, SlotBindings, WorkflowTemplate};
