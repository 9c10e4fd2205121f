//! Ingestion report repository.

use sqlx::{PgConnection, PgPool};

use crate::error::AppError;
use crate::models::sync_report::SyncReport;

const TABLE_NAME: &str = "sync_reports";
const SELECT_COLUMNS: &str =
    "id, kind, rows_read, rows_accepted, rows_skipped, warnings, created_by, created_at";

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReportRepository;

impl SyncReportRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        report: &SyncReport,
    ) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            TABLE_NAME, SELECT_COLUMNS
        );
        sqlx::query(&query)
            .bind(&report.id)
            .bind(report.kind)
            .bind(report.rows_read)
            .bind(report.rows_accepted)
            .bind(report.rows_skipped)
            .bind(&report.warnings)
            .bind(&report.created_by)
            .bind(report.created_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        db: &PgPool,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<SyncReport>, i64), AppError> {
        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE_NAME))
                .fetch_one(db)
                .await?;
        let query = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, SyncReport>(&query)
            .bind(limit as i64)
            .bind(((page.max(1) - 1) as i64) * limit as i64)
            .fetch_all(db)
            .await?;
        Ok((rows, total))
    }
}
