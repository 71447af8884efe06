//! HTTP client for the ComfyUI queue endpoint.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{ComfyError, Result};
use crate::request::GenerationRequest;
use crate::workflow::WorkflowTemplate;

/// Default ComfyUI address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8188";

/// A prompt accepted into ComfyUI's queue.
///
/// Acceptance says nothing about when the output file appears.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueuedPrompt {
    /// Server-assigned id of the queued prompt.
    pub prompt_id: String,

    /// Position in the queue at submission time.
    #[serde(default)]
    pub number: u64,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    #[serde(flatten)]
    queued: QueuedPrompt,
    #[serde(default)]
    node_errors: Map<String, Value>,
}

/// Client for one ComfyUI server.
///
/// Holds its own connection pool and client id; create one per server and
/// pass it to whoever dispatches work.
#[derive(Debug, Clone)]
pub struct ComfyClient {
    base_url: String,
    client_id: String,
    client: reqwest::Client,
}

impl ComfyClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Render `template` for `request` and queue it.
    ///
    /// Returns once ComfyUI has accepted the prompt.
    pub async fn dispatch(
        &self,
        template: &WorkflowTemplate,
        request: &GenerationRequest,
    ) -> Result<QueuedPrompt> {
        let body = serde_json::json!({
            "prompt": template.render(request),
            "client_id": self.client_id,
        });

        debug!(
            "Queueing workflow with seed {} and prompt {:?}",
            request.seed, request.prompt
        );

        let response = self
            .client
            .post(format!("{}/prompt", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComfyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let result: QueueResponse = response.json().await?;
        if !result.node_errors.is_empty() {
            return Err(ComfyError::NodeErrors(
                Value::Object(result.node_errors).to_string(),
            ));
        }

        info!(
            "ComfyUI queued prompt {} at position {}",
            result.queued.prompt_id, result.queued.number
        );
        Ok(result.queued)
    }
}

impl Default for ComfyClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
