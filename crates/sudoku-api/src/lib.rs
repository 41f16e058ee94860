//! Sudoku API: upload endpoint in front of the extract → solve pipeline
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use config::ServerConfig;
use metrics::Metrics;
use std::path::Path;
use sudoku_core::PipelineRunner;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub runner: PipelineRunner,
    pub metrics: Metrics,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(runner: PipelineRunner, metrics: Metrics, max_upload_bytes: usize) -> Self {
        Self {
            runner,
            metrics,
            max_upload_bytes,
        }
    }
}

/// Router with the upload, health and metrics routes; every other path is
/// served from `public_dir`.
pub fn create_app(state: AppState, public_dir: impl AsRef<Path>) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .fallback_service(ServeDir::new(public_dir.as_ref()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors())
                .layer(from_fn(middleware::log_client_errors))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.build_runner(), Metrics::new()?, config.max_upload_bytes);
    let app = create_app(state, &config.public_dir);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;

    tracing::info!(
        addr = %config.addr,
        public_dir = %config.public_dir.display(),
        stage_timeout_secs = config.stage_timeout.as_secs(),
        max_stage_processes = config.max_stage_processes,
        "Sudoku API listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
