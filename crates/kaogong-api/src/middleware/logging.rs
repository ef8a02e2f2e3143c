use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Request logging middleware
pub async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    // Query strings are left out: payment notifications carry signatures
    if status.is_server_error() {
        tracing::error!(method = %method, path = %path, status = %status, duration_ms = %duration.as_millis(), "Request failed");
    } else {
        tracing::info!(method = %method, path = %path, status = %status, duration_ms = %duration.as_millis(), "Request processed");
    }

    response
}
