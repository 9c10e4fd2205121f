//! Liveness probe with a database reachability check.

use std::time::Duration;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{models::envelope::ApiResponse, state::AppState};

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let db_ok = tokio::time::timeout(
        Duration::from_secs(2),
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.pool),
    )
    .await
    .map(|result| result.is_ok())
    .unwrap_or(false);

    Json(ApiResponse::success(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
    })))
}
