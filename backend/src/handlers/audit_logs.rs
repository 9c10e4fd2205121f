//! Audit trail listing and CSV export (admin only).

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::AppError,
    models::audit_log::{AuditAction, AuditLog},
    models::envelope::ApiResponse,
    repositories::audit_log::AuditLogFilter,
    repositories::AuditLogRepository,
    state::AppState,
};

use super::common::Pagination;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    pub entity_kind: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AuditQuery {
    fn filter(&self) -> AuditLogFilter {
        AuditLogFilter {
            action: self.action,
            entity_kind: self.entity_kind.clone(),
            from: self.from,
            to: self.to,
        }
    }
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLog>>>, AppError> {
    let (page, limit) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    let (rows, total) = AuditLogRepository::new()
        .list(&state.pool, &query.filter(), page, limit)
        .await?;
    Ok(Json(ApiResponse::success_paged(rows, page, limit, total)))
}

/// CSV export for retention reviews. Bounded by the repository's row cap.
pub async fn export_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Response, AppError> {
    let rows = AuditLogRepository::new()
        .export(&state.pool, &query.filter())
        .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "occurred_at",
            "actor",
            "action",
            "entity_kind",
            "entity_id",
            "result_extra",
        ])
        .map_err(|err| AppError::Internal(err.into()))?;
    for row in &rows {
        let occurred_at = row.occurred_at.to_rfc3339();
        let extra = row
            .extra
            .as_ref()
            .map(|extra| extra.0.to_string())
            .unwrap_or_default();
        writer
            .write_record([
                row.id.as_str(),
                occurred_at.as_str(),
                row.actor.as_str(),
                row.action.db_value(),
                row.entity_kind.as_str(),
                row.entity_id.as_str(),
                extra.as_str(),
            ])
            .map_err(|err| AppError::Internal(err.into()))?;
    }
    let body = writer
        .into_inner()
        .map_err(|err| AppError::Internal(err.into()))?;

    let mut response = (StatusCode::OK, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"audit_logs.csv\""),
    );
    Ok(response)
}
