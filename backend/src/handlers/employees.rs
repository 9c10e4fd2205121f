//! Employee listing, search, detail, and per-employee leave information.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::employee::{EmployeeCategory, EmployeeRecord},
    models::envelope::ApiResponse,
    models::ledger::{BalanceBreakdown, EmployeeYear},
    repositories::employee::EmployeeListFilter,
    repositories::{EmployeeRepository, LedgerRepository},
    services::employee_cache::ListCacheKey,
    services::ledger::LedgerEngine,
    state::AppState,
    utils::time::fiscal_year_of,
    validation::rules::validate_fiscal_year,
};

use super::common::Pagination;

#[derive(Debug, Deserialize)]
pub struct EmployeeListQuery {
    pub year: Option<i32>,
    pub category: Option<EmployeeCategory>,
    pub active: Option<bool>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl EmployeeListQuery {
    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }
}

pub async fn list_employees(
    State(state): State<AppState>,
    Query(query): Query<EmployeeListQuery>,
) -> Result<Json<ApiResponse<Vec<EmployeeRecord>>>, AppError> {
    let (page, limit) = query.pagination().resolve()?;
    if let Some(year) = query.year {
        validate_fiscal_year(year).map_err(|e| AppError::InvalidArgument(e.code.to_string()))?;
    }

    let cache_key = ListCacheKey {
        year: query.year,
        category: query.category.map(|c| c.db_value().to_string()),
        active: query.active,
        q: query.q.clone(),
        page,
        limit,
    };
    if let Some((rows, total)) = state.employee_cache.get(&cache_key) {
        return Ok(Json(ApiResponse::success_paged(rows, page, limit, total)));
    }

    let filter = EmployeeListFilter {
        year: query.year,
        category: query.category,
        active: query.active,
        q: query.q,
    };
    let (rows, total) = EmployeeRepository::new()
        .list(&state.pool, &filter, page, limit)
        .await?;
    state.employee_cache.put(cache_key, rows.clone(), total);
    Ok(Json(ApiResponse::success_paged(rows, page, limit, total)))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn search_employees(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<EmployeeRecord>>>, AppError> {
    let (page, limit) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    if query.q.trim().is_empty() {
        return Err(AppError::InvalidArgument("q must not be empty".into()));
    }
    let (rows, total) = EmployeeRepository::new()
        .search(&state.pool, query.q.trim(), page, limit)
        .await?;
    Ok(Json(ApiResponse::success_paged(rows, page, limit, total)))
}

#[derive(Debug, Serialize)]
pub struct EmployeeDetail {
    #[serde(flatten)]
    pub record: EmployeeRecord,
    pub years: Vec<EmployeeYear>,
}

pub async fn employee_detail(
    State(state): State<AppState>,
    Path(employee_num): Path<String>,
) -> Result<Json<ApiResponse<EmployeeDetail>>, AppError> {
    let record = EmployeeRepository::new()
        .find_record(&state.pool, &employee_num)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Employee {} not found", employee_num)))?;
    let years = LedgerRepository::new()
        .find_years_for_employee(&state.pool, &employee_num)
        .await?;
    Ok(Json(ApiResponse::success(EmployeeDetail { record, years })))
}

#[derive(Debug, Deserialize)]
pub struct LeaveInfoQuery {
    pub year: Option<i32>,
}

/// Current-year ledger row plus prior-year breakdown in LIFO order.
pub async fn leave_info(
    State(state): State<AppState>,
    Path(employee_num): Path<String>,
    Query(query): Query<LeaveInfoQuery>,
) -> Result<Json<ApiResponse<BalanceBreakdown>>, AppError> {
    let engine = LedgerEngine::new(state.config.fiscal);
    let year = match query.year {
        Some(year) => {
            validate_fiscal_year(year)
                .map_err(|e| AppError::InvalidArgument(e.code.to_string()))?;
            year
        }
        None => fiscal_year_of(Utc::now().date_naive(), &state.config.fiscal),
    };
    let breakdown = engine
        .balance_breakdown(&state.pool, &employee_num, year)
        .await?;
    Ok(Json(ApiResponse::success(breakdown)))
}
