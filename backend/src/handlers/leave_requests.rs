//! Leave request endpoints: creation, listing, and the review transitions.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    models::envelope::ApiResponse,
    models::leave_request::{CreateLeaveRequest, LeaveRequestResponse, RequestStatus},
    models::user::User,
    repositories::leave_request::LeaveRequestFilter,
    repositories::LeaveRequestRepository,
    services::ledger::LedgerEngine,
    services::workflow::{ActorContext, RequestWorkflow},
    state::AppState,
};

use super::common::Pagination;

fn workflow(state: &AppState) -> RequestWorkflow {
    RequestWorkflow::new(LedgerEngine::new(state.config.fiscal), state.notifier.clone())
}

fn actor_context(headers: &axum::http::HeaderMap) -> ActorContext {
    ActorContext {
        source_ip: headers
            .get("x-forwarded-for")
            .or_else(|| headers.get("x-real-ip"))
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
    }
}

pub async fn create_leave_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    headers: axum::http::HeaderMap,
    Json(payload): Json<CreateLeaveRequest>,
) -> Result<Json<ApiResponse<LeaveRequestResponse>>, AppError> {
    let created = workflow(&state)
        .create(&state.pool, payload, &user, &actor_context(&headers))
        .await?;
    Ok(Json(ApiResponse::success(created.into())))
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<RequestStatus>,
    pub employee_num: Option<String>,
    pub year: Option<i32>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_leave_requests(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<ApiResponse<Vec<LeaveRequestResponse>>>, AppError> {
    let (page, limit) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;

    // Plain users see their own requests regardless of the filter.
    let employee_num = if user.can_approve() {
        query.employee_num
    } else {
        match &user.employee_num {
            Some(own) => Some(own.clone()),
            None => {
                return Err(AppError::Forbidden(
                    "Account is not linked to an employee record".into(),
                ))
            }
        }
    };

    let filter = LeaveRequestFilter {
        status: query.status,
        employee_num,
        year: query.year,
    };
    let (rows, total) = LeaveRequestRepository::new()
        .list(&state.pool, &filter, page, limit)
        .await?;
    let rows: Vec<LeaveRequestResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success_paged(rows, page, limit, total)))
}

pub async fn list_my_leave_requests(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<ApiResponse<Vec<LeaveRequestResponse>>>, AppError> {
    let (page, limit) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    let employee_num = user.employee_num.clone().ok_or_else(|| {
        AppError::Forbidden("Account is not linked to an employee record".into())
    })?;
    let filter = LeaveRequestFilter {
        status: query.status,
        employee_num: Some(employee_num),
        year: query.year,
    };
    let (rows, total) = LeaveRequestRepository::new()
        .list(&state.pool, &filter, page, limit)
        .await?;
    let rows: Vec<LeaveRequestResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success_paged(rows, page, limit, total)))
}

#[derive(Debug, Deserialize, Default)]
pub struct DecisionPayload {
    pub comment: Option<String>,
}

pub async fn approve_leave_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
    payload: Option<Json<DecisionPayload>>,
) -> Result<Json<ApiResponse<LeaveRequestResponse>>, AppError> {
    let comment = payload.and_then(|Json(p)| p.comment);
    let approved = workflow(&state)
        .approve(&state.pool, &id, &user, comment, &actor_context(&headers))
        .await?;
    state.employee_cache.invalidate_year(approved.year);
    Ok(Json(ApiResponse::success(approved.into())))
}

pub async fn reject_leave_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
    payload: Option<Json<DecisionPayload>>,
) -> Result<Json<ApiResponse<LeaveRequestResponse>>, AppError> {
    let comment = payload.and_then(|Json(p)| p.comment);
    let rejected = workflow(&state)
        .reject(&state.pool, &id, &user, comment, &actor_context(&headers))
        .await?;
    Ok(Json(ApiResponse::success(rejected.into())))
}

pub async fn revert_leave_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<LeaveRequestResponse>>, AppError> {
    let reverted = workflow(&state)
        .revert(&state.pool, &id, &user, &actor_context(&headers))
        .await?;
    state.employee_cache.invalidate_year(reverted.year);
    Ok(Json(ApiResponse::success(reverted.into())))
}

pub async fn cancel_leave_request(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<LeaveRequestResponse>>, AppError> {
    let cancelled = workflow(&state)
        .cancel(&state.pool, &id, &user, &actor_context(&headers))
        .await?;
    Ok(Json(ApiResponse::success(cancelled.into())))
}
