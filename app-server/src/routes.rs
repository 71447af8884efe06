//! HTTP routes.

use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::pipeline::{GenerationInput, GenerationPipeline};

/// URL prefix generated images are served under.
pub const OUTPUTS_PREFIX: &str = "/outputs";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<GenerationPipeline>,
    shutdown: CancellationToken,
}

impl AppState {
    /// `shutdown` ends in-flight watches when the server stops.
    pub fn new(pipeline: GenerationPipeline, shutdown: CancellationToken) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            shutdown,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub concept: String,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub prompt: String,
    pub prompt_id: String,
    pub image_path: String,
    pub image_url: String,
}

/// Build the application router.
///
/// Generated images are served from the pipeline's output directory under
/// [`OUTPUTS_PREFIX`]; everything else unmatched falls through to
/// `static_dir`, so `/` serves its `index.html`.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    let outputs = ServeDir::new(state.pipeline.output_dir());

    Router::new()
        .route("/health", get(health))
        .route("/prompt", post(expand_prompt))
        .route("/generate", post(generate))
        .nest_service(OUTPUTS_PREFIX, outputs)
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn expand_prompt(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<PromptResponse>, ApiError> {
    let prompt = state
        .pipeline
        .expand(&request.concept, request.style.as_deref())
        .await?;
    Ok(Json(PromptResponse { prompt }))
}

async fn generate(
    State(state): State<AppState>,
    Json(input): Json<GenerationInput>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let outcome = state.pipeline.generate(&input, &state.shutdown).await?;

    let file_name = outcome
        .image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Json(GenerateResponse {
        status: "ok",
        prompt: outcome.prompt,
        prompt_id: outcome.prompt_id,
        image_path: outcome.image_path.display().to_string(),
        image_url: format!("{OUTPUTS_PREFIX}/{file_name}"),
    }))
}
