//! Five-day rule compliance classification.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::envelope::ApiResponse,
    services::ledger::{FiveDayReport, LedgerEngine},
    state::AppState,
    validation::rules::validate_fiscal_year,
};

pub async fn five_day(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<Json<ApiResponse<FiveDayReport>>, AppError> {
    validate_fiscal_year(year).map_err(|e| AppError::InvalidArgument(e.code.to_string()))?;
    let report = LedgerEngine::new(state.config.fiscal)
        .check_five_day(&state.pool, year, Utc::now().date_naive())
        .await?;
    Ok(Json(ApiResponse::success(report)))
}
