//! Bearer-token authentication middleware and role gates.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError, models::user::User, repositories::UserRepository, state::AppState,
    utils::jwt::verify_access_token,
};

pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(user.clone());
    let mut response = next.run(request).await;
    // The request logger reads the principal from response extensions.
    response.extensions_mut().insert(user);
    Ok(response)
}

/// Auth + approver scope for review routes.
pub async fn auth_approver(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, request.headers()).await?;
    if !user.can_approve() {
        return Err(AppError::Forbidden("Approver scope required".into()));
    }
    request.extensions_mut().insert(user.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(user);
    Ok(response)
}

/// Auth + admin scope for ingestion, carry-over and audit routes.
pub async fn auth_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, request.headers()).await?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("Admin scope required".into()));
    }
    request.extensions_mut().insert(user.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(user);
    Ok(response)
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => {
            header.strip_prefix("Bearer ").unwrap_or("")
        }
        _ => {
            return Err(AppError::Unauthenticated(
                "Missing bearer token".to_string(),
            ));
        }
    };

    let claims = verify_access_token(token, &state.config.jwt_secret, &state.config.jwt_key_id)?;

    UserRepository::new()
        .find_by_id(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Unknown principal".to_string()))
}

/// Helper for handlers that read the authenticated user from extensions.
pub fn current_user(request: &Request) -> Option<&User> {
    request.extensions().get::<User>()
}
