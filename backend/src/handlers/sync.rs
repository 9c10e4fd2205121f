//! Workbook ingestion endpoints (admin only).
//!
//! One ingestion runs at a time; a concurrent attempt fails `Conflict`.
//! Runs carry a deadline of their own, longer than the request default.

use std::time::Duration;

use axum::{
    extract::{Extension, Multipart, Query, State},
    Json,
};

use crate::{
    error::AppError,
    models::envelope::ApiResponse,
    models::sync_report::{IngestionReport, SyncReport},
    models::user::User,
    repositories::SyncReportRepository,
    services::ingestion::IngestionService,
    state::AppState,
};

use super::common::Pagination;

pub async fn sync_vacation(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<IngestionReport>>, AppError> {
    let bytes = read_workbook_part(multipart).await?;
    let _guard = state
        .sync_lock
        .try_lock()
        .map_err(|_| AppError::Conflict("Another ingestion is already running".into()))?;

    let report = tokio::time::timeout(
        Duration::from_secs(state.config.ingestion_timeout_secs),
        IngestionService::new().ingest_vacation(&state.pool, &bytes, &state.config.fiscal, &user),
    )
    .await
    .map_err(|_| AppError::ServiceUnavailable("Ingestion deadline exceeded".into()))??;

    state.employee_cache.invalidate_all();
    Ok(Json(ApiResponse::success(report)))
}

pub async fn sync_register(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<IngestionReport>>, AppError> {
    let bytes = read_workbook_part(multipart).await?;
    let _guard = state
        .sync_lock
        .try_lock()
        .map_err(|_| AppError::Conflict("Another ingestion is already running".into()))?;

    let report = tokio::time::timeout(
        Duration::from_secs(state.config.ingestion_timeout_secs),
        IngestionService::new().ingest_register(&state.pool, &bytes, &user),
    )
    .await
    .map_err(|_| AppError::ServiceUnavailable("Ingestion deadline exceeded".into()))??;

    state.employee_cache.invalidate_all();
    Ok(Json(ApiResponse::success(report)))
}

#[derive(Debug, serde::Deserialize)]
pub struct ReportsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn list_sync_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncReport>>>, AppError> {
    let (page, limit) = Pagination {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;
    let (rows, total) = SyncReportRepository::new()
        .list(&state.pool, page, limit)
        .await?;
    Ok(Json(ApiResponse::success_paged(rows, page, limit, total)))
}

/// Pulls the uploaded workbook out of the multipart body.
async fn read_workbook_part(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::InvalidArgument(format!("Malformed multipart body: {}", err)))?
    {
        let is_file = field.file_name().is_some() || field.name() == Some("file");
        if !is_file {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::InvalidArgument(format!("Unreadable upload: {}", err)))?;
        if bytes.is_empty() {
            return Err(AppError::InvalidArgument("Uploaded workbook is empty".into()));
        }
        return Ok(bytes.to_vec());
    }
    Err(AppError::InvalidArgument(
        "Multipart body carries no workbook file".into(),
    ))
}
