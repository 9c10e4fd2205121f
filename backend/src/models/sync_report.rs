//! Ingestion run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkbookKind {
    Vacation,
    Register,
}

impl WorkbookKind {
    pub fn db_value(&self) -> &'static str {
        match self {
            WorkbookKind::Vacation => "vacation",
            WorkbookKind::Register => "register",
        }
    }
}

/// Aggregated outcome of one ingestion run. Malformed rows are skipped and
/// reported here; only a malformed file aborts the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionReport {
    pub rows_read: u32,
    pub rows_accepted: u32,
    pub rows_skipped: u32,
    pub warnings: Vec<String>,
}

impl IngestionReport {
    pub fn skip(&mut self, row: u32, reason: impl std::fmt::Display) {
        self.rows_skipped += 1;
        self.warnings.push(format!("row {}: {}", row, reason));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncReport {
    pub id: String,
    pub kind: WorkbookKind,
    pub rows_read: i32,
    pub rows_accepted: i32,
    pub rows_skipped: i32,
    pub warnings: Json<Vec<String>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn from_report(kind: WorkbookKind, report: &IngestionReport, created_by: String) -> Self {
        SyncReport {
            id: Uuid::new_v4().to_string(),
            kind,
            rows_read: report.rows_read as i32,
            rows_accepted: report.rows_accepted as i32,
            rows_skipped: report.rows_skipped as i32,
            warnings: Json(report.warnings.clone()),
            created_by,
            created_at: Utc::now(),
        }
    }
}
