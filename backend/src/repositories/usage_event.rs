//! Usage event repository.

use sqlx::{PgConnection, PgPool};

use crate::error::AppError;
use crate::models::usage_event::UsageEvent;

const TABLE_NAME: &str = "usage_events";
const SELECT_COLUMNS: &str =
    "id, employee_num, year, use_date, days_used, kind, source, request_id, created_at";

#[derive(Debug, Default, Clone, Copy)]
pub struct UsageEventRepository;

impl UsageEventRepository {
    pub fn new() -> Self {
        Self
    }

    /// Last-writer-wins upsert keyed on (employee_num, year, use_date), so
    /// re-ingesting the same workbook converges.
    pub async fn upsert(
        &self,
        conn: &mut PgConnection,
        event: &UsageEvent,
    ) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (employee_num, year, use_date) DO UPDATE SET \
             days_used = $5, kind = $6, source = $7, request_id = $8",
            TABLE_NAME, SELECT_COLUMNS
        );
        sqlx::query(&query)
            .bind(&event.id)
            .bind(&event.employee_num)
            .bind(event.year)
            .bind(event.use_date)
            .bind(event.days_used)
            .bind(event.kind)
            .bind(event.source)
            .bind(&event.request_id)
            .bind(event.created_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_request(
        &self,
        conn: &mut PgConnection,
        request_id: &str,
    ) -> Result<Vec<UsageEvent>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE request_id = $1 ORDER BY use_date",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, UsageEvent>(&query)
            .bind(request_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Removes the events an approval appended, returning them for auditing.
    pub async fn delete_by_request(
        &self,
        conn: &mut PgConnection,
        request_id: &str,
    ) -> Result<Vec<UsageEvent>, AppError> {
        let query = format!(
            "DELETE FROM {} WHERE request_id = $1 RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, UsageEvent>(&query)
            .bind(request_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    pub async fn list_for_year(
        &self,
        db: &PgPool,
        employee_num: &str,
        year: i32,
    ) -> Result<Vec<UsageEvent>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE employee_num = $1 AND year = $2 ORDER BY use_date",
            SELECT_COLUMNS, TABLE_NAME
        );
        let rows = sqlx::query_as::<_, UsageEvent>(&query)
            .bind(employee_num)
            .bind(year)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

    /// Consumption total for one ledger row; expiry markers carry no days.
    pub async fn sum_days(
        &self,
        db: &PgPool,
        employee_num: &str,
        year: i32,
    ) -> Result<f64, AppError> {
        let query = format!(
            "SELECT COALESCE(SUM(days_used), 0) FROM {} \
             WHERE employee_num = $1 AND year = $2 AND kind <> 'expired'",
            TABLE_NAME
        );
        let total: (f64,) = sqlx::query_as(&query)
            .bind(employee_num)
            .bind(year)
            .fetch_one(db)
            .await?;
        Ok(total.0)
    }
}
