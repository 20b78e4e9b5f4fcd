use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use super::request_id::get_request_id;

/// One log line per request: method, path, status and latency.
/// Runs inside [`super::request_id_middleware`] so the request id is available.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = get_request_id(&request).unwrap_or_default();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    if response.status().is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = status,
            duration_ms = duration_ms,
            request_id = %request_id,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status,
            duration_ms = duration_ms,
            request_id = %request_id,
            "Request completed"
        );
    }

    response
}
