//! Fiscal operations: LIFO balance breakdown and year-end carry-over.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    models::audit_log::{AuditAction, NewAuditEntry},
    models::envelope::ApiResponse,
    models::ledger::BalanceBreakdown,
    models::user::User,
    repositories::repository::transaction::{begin_transaction, commit_transaction},
    repositories::AuditLogRepository,
    services::ledger::{CarryOverSummary, LedgerEngine},
    state::AppState,
    utils::time::fiscal_year_of,
    validation::rules::validate_fiscal_year,
};

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub year: Option<i32>,
}

pub async fn balance(
    State(state): State<AppState>,
    Path(employee_num): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<ApiResponse<BalanceBreakdown>>, AppError> {
    let year = match query.year {
        Some(year) => {
            validate_fiscal_year(year)
                .map_err(|e| AppError::InvalidArgument(e.code.to_string()))?;
            year
        }
        None => fiscal_year_of(Utc::now().date_naive(), &state.config.fiscal),
    };
    let breakdown = LedgerEngine::new(state.config.fiscal)
        .balance_breakdown(&state.pool, &employee_num, year)
        .await?;
    Ok(Json(ApiResponse::success(breakdown)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CarryOverPayload {
    #[validate(range(min = 2000, max = 2100))]
    pub from_year: i32,
    #[validate(range(min = 2000, max = 2100))]
    pub to_year: i32,
}

/// Year-end carry-over. Idempotent per (from_year, to_year): already closed
/// source rows are skipped on a re-run.
pub async fn carry_over(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CarryOverPayload>,
) -> Result<Json<ApiResponse<CarryOverSummary>>, AppError> {
    payload.validate()?;
    let summary = LedgerEngine::new(state.config.fiscal)
        .carry_over(&state.pool, payload.from_year, payload.to_year)
        .await?;

    // The operation itself is audited per row inside its transaction; this
    // entry records who triggered it.
    let mut tx = begin_transaction(&state.pool).await?;
    let entry = NewAuditEntry::new(
        user.id.clone(),
        AuditAction::Sync,
        "carry_over",
        format!("{}->{}", payload.from_year, payload.to_year),
    )
    .with_extra(serde_json::to_value(&summary).unwrap_or_default());
    AuditLogRepository::new().insert(&mut tx, &entry.stamp()).await?;
    commit_transaction(tx).await?;

    state.employee_cache.invalidate_year(payload.from_year);
    state.employee_cache.invalidate_year(payload.to_year);
    Ok(Json(ApiResponse::success(summary)))
}
