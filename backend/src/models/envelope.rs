//! Uniform response envelope shared by every endpoint.
//!
//! Success and error responses carry the same outer shape so clients can
//! parse either without sniffing the HTTP status first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// API version advertised in `meta.version`.
pub const API_VERSION: &str = "v1";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

impl Meta {
    pub fn bare() -> Self {
        Meta {
            page: None,
            limit: None,
            total: None,
            total_pages: None,
            timestamp: Utc::now(),
            version: API_VERSION,
        }
    }

    pub fn paged(page: u32, limit: u32, total: i64) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            ((total as u64).div_ceil(limit.max(1) as u64)) as u32
        };
        Meta {
            page: Some(page),
            limit: Some(limit),
            total: Some(total),
            total_pages: Some(total_pages),
            timestamp: Utc::now(),
            version: API_VERSION,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            status: "success",
            data: Some(data),
            error: None,
            meta: Meta::bare(),
        }
    }

    pub fn success_paged(data: T, page: u32, limit: u32, total: i64) -> Self {
        ApiResponse {
            status: "success",
            data: Some(data),
            error: None,
            meta: Meta::paged(page, limit, total),
        }
    }
}

impl ApiResponse<Value> {
    pub fn failure(code: String, message: String, details: Option<Value>) -> Self {
        ApiResponse {
            status: "error",
            data: None,
            error: Some(ErrorBody {
                code,
                message,
                details,
            }),
            meta: Meta::bare(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_meta_rounds_total_pages_up() {
        let meta = Meta::paged(1, 50, 101);
        assert_eq!(meta.total_pages, Some(3));
        assert_eq!(meta.total, Some(101));
    }

    #[test]
    fn paged_meta_handles_empty_collections() {
        let meta = Meta::paged(1, 50, 0);
        assert_eq!(meta.total_pages, Some(0));
    }

    #[test]
    fn failure_envelope_serializes_error_side() {
        let body = ApiResponse::failure("not_found".into(), "Employee not found".into(), None);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["data"], Value::Null);
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["meta"]["version"], "v1");
    }
}
