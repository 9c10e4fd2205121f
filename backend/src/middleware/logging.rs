//! Structured request logging.
//!
//! Logs method, path, principal id, status and duration. Request bodies are
//! never logged; wages, birth dates and other register PII stay out of the
//! log stream by construction.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

use crate::middleware::request_id::RequestId;
use crate::models::user::User;

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(request).await;

    let principal = response
        .extensions()
        .get::<User>()
        .map(|user| user.id.clone());
    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        principal = principal.as_deref().unwrap_or("-"),
        request_id = %request_id,
        "request handled"
    );
    response
}
