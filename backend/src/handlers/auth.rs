//! Token issue and session endpoints.

use axum::{extract::State, http::HeaderValue, response::IntoResponse, response::Response, Json};
use validator::Validate;

use crate::{
    error::AppError,
    models::envelope::ApiResponse,
    models::user::{LoginRequest, LoginResponse},
    repositories::UserRepository,
    state::AppState,
    utils::{
        jwt::create_access_token,
        password::{is_modern_hash, verify_password},
        security::{constant_time_eq, issue_csrf_token, mask_user_lookup_timing, CSRF_HEADER},
    },
};

/// Issues a bearer token on valid credentials. The CSRF token for browser
/// clients travels in the `x-csrf-token` response header.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let user = match UserRepository::new()
        .find_by_username(&state.pool, &payload.username)
        .await?
    {
        Some(user) => user,
        None => {
            // Same work as the found branch, so timing does not reveal
            // which usernames exist.
            mask_user_lookup_timing(&payload.password);
            return Err(AppError::Unauthenticated("Invalid credentials".into()));
        }
    };

    let verified = if is_modern_hash(&user.password_hash) {
        verify_password(&payload.password, &user.password_hash)?
    } else if legacy_credentials_allowed(&state) {
        tracing::warn!(username = %user.username, "legacy credential accepted in development mode");
        constant_time_eq(payload.password.as_bytes(), user.password_hash.as_bytes())
    } else {
        tracing::error!(username = %user.username, "legacy-formatted credential rejected");
        return Err(AppError::Unauthenticated("Invalid credentials".into()));
    };
    if !verified {
        return Err(AppError::Unauthenticated("Invalid credentials".into()));
    }

    let (token, claims) = create_access_token(
        user.id.clone(),
        user.username.clone(),
        user.role.as_str().to_string(),
        &state.config.jwt_secret,
        &state.config.jwt_key_id,
        state.config.jwt_expiration_hours,
    )?;

    let body = LoginResponse {
        token,
        token_type: "Bearer",
        expires_at: claims.expires_at(),
        username: user.username,
        role: user.role,
    };
    let mut response = Json(ApiResponse::success(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&issue_csrf_token()) {
        response.headers_mut().insert(CSRF_HEADER, value);
    }
    Ok(response)
}

/// Tokens are stateless; logout exists so clients have a uniform place to
/// drop their session material.
pub async fn logout() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!({ "logged_out": true })))
}

fn legacy_credentials_allowed(state: &AppState) -> bool {
    !state.config.production_mode
        && std::env::var("ALLOW_LEGACY_PASSWORDS")
            .map(|v| v == "true")
            .unwrap_or(false)
}
