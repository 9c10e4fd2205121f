//! Shared handler plumbing: pagination contract and envelope helpers.

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

/// Query-string pagination accepted by every list endpoint. No endpoint
/// returns an unbounded collection.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl Pagination {
    pub fn resolve(&self) -> Result<(u32, u32), AppError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        if page < 1 {
            return Err(AppError::InvalidArgument("page must be >= 1".into()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::InvalidArgument(format!(
                "limit must be in 1..={}",
                MAX_LIMIT
            )));
        }
        Ok((page, limit))
    }
}
