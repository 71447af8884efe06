//! HTTP server lifecycle.

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::pipeline::GenerationPipeline;
use crate::routes::{AppState, router};

/// Run the server until Ctrl-C.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let pipeline = GenerationPipeline::from_config(&config).await?;
    let shutdown = CancellationToken::new();
    let app = router(AppState::new(pipeline, shutdown.clone()), &config.static_dir);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    Ok(())
}
