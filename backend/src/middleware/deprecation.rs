//! Deprecation headers for the legacy unversioned paths.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Canonical endpoints live under `/v1/`; everything else served by the
/// legacy alias advertises its sunset date.
pub async fn deprecation(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let legacy = !request.uri().path().starts_with("/v1/");
    let mut response = next.run(request).await;
    if legacy {
        response
            .headers_mut()
            .insert("deprecation", HeaderValue::from_static("true"));
        if let Ok(value) = HeaderValue::from_str(&state.config.legacy_api_sunset) {
            response.headers_mut().insert("sunset", value);
        }
    }
    response
}
