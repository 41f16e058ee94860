//! Layers shared by every route.
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tower_http::cors::CorsLayer;
use tracing::debug;

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Logs requests rejected by extractors (body limit, bad multipart) that
/// never reach a handler's own logging.
pub async fn log_client_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    if response.status().is_client_error() {
        debug!(%method, %path, status = %response.status(), "client error");
    }
    response
}
