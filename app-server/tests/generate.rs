//! Router-level tests against mocked Ollama and ComfyUI servers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use atelier_app_server::config::AppConfig;
use atelier_app_server::{AppState, GenerationPipeline, router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

/// Accepts the prompt and, like ComfyUI's SaveImage node, drops a file into
/// the output directory.
struct SaveImage {
    output: PathBuf,
}

impl Respond for SaveImage {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        std::fs::write(&self.output, vec![0x89, b'P', b'N', b'G', 0, 0, 0, 0]).unwrap();
        ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": "7f6d", "number": 1, "node_errors": {}
        }))
    }
}

/// Like [`SaveImage`], but numbers each output the way ComfyUI's counter
/// does and records when each prompt arrived.
struct NumberedSaveImage {
    output_dir: PathBuf,
    next: AtomicUsize,
    dispatched: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for NumberedSaveImage {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let number = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatched.lock().unwrap().push(Instant::now());
        let output = self
            .output_dir
            .join(format!("generated_image_{number:05}_.png"));
        std::fs::write(output, vec![0x89, b'P', b'N', b'G', 0, 0, 0, 0]).unwrap();
        ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": format!("prompt-{number}"), "number": number, "node_errors": {}
        }))
    }
}

struct Harness {
    _temp_dir: TempDir,
    output_dir: PathBuf,
    config: AppConfig,
    comfy: MockServer,
    ollama: MockServer,
}

impl Harness {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let output_dir = temp_dir.path().join("output");
        let static_dir = temp_dir.path().join("static");
        std::fs::create_dir(&output_dir).unwrap();
        std::fs::create_dir(&static_dir).unwrap();
        std::fs::write(static_dir.join("index.html"), "<h1>atelier</h1>").unwrap();

        let workflow = temp_dir.path().join("workflow.json");
        std::fs::write(&workflow, workflow_json().to_string()).unwrap();

        let comfy = MockServer::start().await;
        let ollama = MockServer::start().await;

        let mut config = AppConfig::default();
        config.static_dir = static_dir;
        config.ollama.base_url = ollama.uri();
        config.comfy.base_url = comfy.uri();
        config.comfy.workflow = workflow;
        config.output.dir = output_dir.clone();
        config.output.poll_interval_ms = 10;
        config.output.settle_delay_ms = 30;
        config.output.timeout_secs = 1;

        Self {
            _temp_dir: temp_dir,
            output_dir,
            config,
            comfy,
            ollama,
        }
    }

    async fn app(&self) -> Router {
        let pipeline = GenerationPipeline::from_config(&self.config).await.unwrap();
        router(
            AppState::new(pipeline, CancellationToken::new()),
            &self.config.static_dir,
        )
    }
}

fn workflow_json() -> Value {
    json!({
        "prompt": {
            "3": {"class_type": "KSampler", "inputs": {"seed": 1, "steps": 20}},
            "5": {"class_type": "EmptyLatentImage", "inputs": {"width": 512, "height": 512}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
            "7": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
            "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "generated_image"}}
        }
    })
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn mount_save_image(output_dir: &Path) -> Mock {
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(SaveImage {
            output: output_dir.join("generated_image_00001_.png"),
        })
}

#[tokio::test]
async fn test_concept_is_expanded_and_output_served() {
    let harness = Harness::new().await;
    std::fs::write(harness.output_dir.join("generated_image_00000_.png"), b"old").unwrap();

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "A red fox curled up in fresh snow, soft morning light"
        })))
        .expect(1)
        .mount(&harness.ollama)
        .await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({"prompt": {"6": {"inputs": {
            "text": "A red fox curled up in fresh snow, soft morning light"
        }}}})))
        .respond_with(SaveImage {
            output: harness.output_dir.join("generated_image_00001_.png"),
        })
        .expect(1)
        .mount(&harness.comfy)
        .await;

    let app = harness.app().await;
    let (status, body) = post_json(
        app.clone(),
        "/generate",
        json!({"prompt": "", "concept": "fox in snow", "style": "photo", "seed": 5}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["prompt_id"], "7f6d");
    assert_eq!(
        body["prompt"],
        "A red fox curled up in fresh snow, soft morning light"
    );
    assert_eq!(body["image_url"], "/outputs/generated_image_00001_.png");

    let (status, bytes) = get(app, "/outputs/generated_image_00001_.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[1..4], b"PNG");
}

#[tokio::test]
async fn test_explicit_prompt_skips_ollama() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.ollama)
        .await;
    mount_save_image(&harness.output_dir)
        .expect(1)
        .mount(&harness.comfy)
        .await;

    let (status, body) = post_json(
        harness.app().await,
        "/generate",
        json!({"prompt": "a lighthouse at dusk"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "a lighthouse at dusk");
}

#[tokio::test]
async fn test_concurrent_generations_claim_their_own_output() {
    let harness = Harness::new().await;
    let dispatched = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(NumberedSaveImage {
            output_dir: harness.output_dir.clone(),
            next: AtomicUsize::new(0),
            dispatched: Arc::clone(&dispatched),
        })
        .expect(2)
        .mount(&harness.comfy)
        .await;

    let app = harness.app().await;
    let (first, second) = tokio::join!(
        post_json(app.clone(), "/generate", json!({"prompt": "a heron"})),
        post_json(app, "/generate", json!({"prompt": "a crane"})),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    let urls: BTreeSet<String> = [&first.1, &second.1]
        .iter()
        .map(|body| body["image_url"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        urls,
        BTreeSet::from([
            "/outputs/generated_image_00001_.png".to_string(),
            "/outputs/generated_image_00002_.png".to_string(),
        ])
    );

    // The second prompt is only queued once the first output has settled.
    let dispatched = dispatched.lock().unwrap().clone();
    assert_eq!(dispatched.len(), 2);
    let settle = Duration::from_millis(harness.config.output.settle_delay_ms);
    assert!(
        dispatched[1] - dispatched[0] >= settle,
        "dispatches only {:?} apart",
        dispatched[1] - dispatched[0]
    );
}

#[tokio::test]
async fn test_no_output_times_out() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": "lost", "number": 0, "node_errors": {}
        })))
        .mount(&harness.comfy)
        .await;

    let (status, body) = post_json(
        harness.app().await,
        "/generate",
        json!({"prompt": "nothing will come of this"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "generation did not complete in time");
}

#[tokio::test]
async fn test_missing_prompt_and_concept() {
    let harness = Harness::new().await;

    let (status, body) = post_json(
        harness.app().await,
        "/generate",
        json!({"prompt": "  ", "negative_prompt": "blurry"}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "either a prompt or a concept is required");
}

#[tokio::test]
async fn test_backend_rejection_is_bad_gateway() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid prompt"))
        .mount(&harness.comfy)
        .await;

    let (status, body) = post_json(
        harness.app().await,
        "/generate",
        json!({"prompt": "a cat"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("invalid prompt"));
}

#[tokio::test]
async fn test_prompt_endpoint() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "expanded"})))
        .mount(&harness.ollama)
        .await;

    let (status, body) = post_json(
        harness.app().await,
        "/prompt",
        json!({"concept": "tea ceremony"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"prompt": "expanded"}));
}

#[tokio::test]
async fn test_health_and_index() {
    let harness = Harness::new().await;
    let app = harness.app().await;

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"ok": true}));

    let (status, body) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>atelier</h1>");
}

#[tokio::test]
async fn test_unreadable_output_dir_fails_startup() {
    let mut harness = Harness::new().await;
    harness.config.output.dir = harness.output_dir.join("missing");

    let result = GenerationPipeline::from_config(&harness.config).await;
    assert!(result.is_err());
}
