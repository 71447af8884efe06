//! Error types for the ComfyUI client.

use thiserror::Error;

use crate::workflow::Role;

/// Result type alias for ComfyUI operations.
pub type Result<T> = std::result::Result<T, ComfyError>;

/// Errors that can occur while preparing or dispatching a workflow.
#[derive(Error, Debug)]
pub enum ComfyError {
    /// The workflow JSON does not have the API-format shape.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// A role is bound to a node the workflow does not contain.
    #[error("{role} slot refers to unknown node {node:?}")]
    UnknownNode { role: Role, node: String },

    /// A role is bound to an input the node does not have.
    #[error("{role} slot refers to unknown input {input:?} on node {node:?}")]
    UnknownInput {
        role: Role,
        node: String,
        input: String,
    },

    /// ComfyUI answered with a non-success status.
    #[error("ComfyUI rejected the workflow ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// ComfyUI accepted the request but reported per-node errors.
    #[error("ComfyUI reported node errors: {0}")]
    NodeErrors(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
