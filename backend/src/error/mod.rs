use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::envelope::ApiResponse;

/// Failure taxonomy shared by the ledger engine, the request workflow, the
/// ingestion pipeline and the HTTP plane. Domain code returns these as typed
/// values; the HTTP layer maps them to status codes in one place.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Validation failed")]
    Validation(Vec<String>),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    InvalidToken(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient leave balance")]
    InsufficientBalance { available: f64, requested: f64 },
    #[error("{0}")]
    PolicyViolation(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("Too many requests")]
    TooManyRequests { retry_after: u64 },
    #[error("Carry-over failed for {employee_num}/{year}: {reason}")]
    CarryOverFailed {
        employee_num: String,
        year: i32,
        reason: String,
    },
    #[error("{0}")]
    IngestionFailed(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code surfaced in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) | AppError::Validation(_) => "invalid_argument",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::PolicyViolation(_) => "policy_violation",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::TooManyRequests { .. } => "too_many_requests",
            AppError::CarryOverFailed { .. } => "carry_over_failed",
            AppError::IngestionFailed(_) => "ingestion_failed",
            AppError::ServiceUnavailable(_) => "service_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_)
            | AppError::Validation(_)
            | AppError::InsufficientBalance { .. }
            | AppError::PolicyViolation(_)
            | AppError::InvalidTransition(_)
            | AppError::CarryOverFailed { .. }
            | AppError::IngestionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthenticated(_) | AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::Validation(errors) => Some(json!({ "errors": errors })),
            AppError::InsufficientBalance {
                available,
                requested,
            } => Some(json!({ "available": available, "requested": requested })),
            AppError::CarryOverFailed {
                employee_num, year, ..
            } => Some(json!({ "employee_num": employee_num, "year": year })),
            AppError::TooManyRequests { retry_after } => {
                Some(json!({ "retry_after": retry_after }))
            }
            _ => None,
        }
    }

    fn client_message(&self) -> String {
        match self {
            // Internal detail stays in the server log, never in the body.
            AppError::Internal(err) => {
                tracing::error!("Internal server error: {:?}", err);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::failure(
            self.code().to_string(),
            self.client_message(),
            self.details(),
        );
        let mut response = (status, Json(body)).into_response();
        if let AppError::TooManyRequests { retry_after } = self {
            if let Ok(value) = header::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool exhausted".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::InvalidArgument("Referenced record does not exist".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Record already exists".to_string())
            }
            _ => AppError::Internal(err.into()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| format!("{}: {}", field, e.code))
            })
            .collect();
        if messages.is_empty() {
            // Struct-level (schema) failures do not appear per field.
            messages.push(err.to_string());
        }
        messages.sort();
        AppError::Validation(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_failures_map_to_422_with_distinct_codes() {
        let insufficient = AppError::InsufficientBalance {
            available: 3.0,
            requested: 5.0,
        };
        assert_eq!(insufficient.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(insufficient.code(), "insufficient_balance");

        let transition = AppError::InvalidTransition("rejected accepts no events".into());
        assert_eq!(transition.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(transition.code(), "invalid_transition");
    }

    #[test]
    fn insufficient_balance_details_carry_the_delta() {
        let err = AppError::InsufficientBalance {
            available: 19.0,
            requested: 25.0,
        };
        let details = err.details().unwrap();
        assert_eq!(details["available"], 19.0);
        assert_eq!(details["requested"], 25.0);
    }

    #[test]
    fn internal_error_hides_detail_from_clients() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused at 10.0.0.3"));
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
