//! Leave request repository.
//!
//! Provides CRUD plus the guarded status transitions used by the workflow.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::models::ledger::DeductionLine;
use crate::models::leave_request::{LeaveRequest, RequestStatus};
use crate::repositories::repository::Repository;

const TABLE_NAME: &str = "leave_requests";
const DEDUCTIONS_TABLE: &str = "leave_request_deductions";
const SELECT_COLUMNS: &str = "id, employee_num, employee_name, year, start_date, end_date, \
days_requested, hours_requested, leave_type, reason, status, requested_at, approved_by, \
approved_at, rejected_by, rejected_at, cancelled_at, decision_comment, hourly_wage, \
cost_estimate, updated_at";

#[derive(Debug, Clone, Default)]
pub struct LeaveRequestFilter {
    pub status: Option<RequestStatus>,
    pub employee_num: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LeaveRequestRepository;

impl LeaveRequestRepository {
    pub fn new() -> Self {
        Self
    }

    fn base_select_query() -> String {
        format!("SELECT {} FROM {}", SELECT_COLUMNS, TABLE_NAME)
    }

    /// Locks one request row for the duration of a workflow transition.
    pub async fn find_for_update(
        &self,
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<LeaveRequest, AppError> {
        let query = format!("{} WHERE id = $1 FOR UPDATE", Self::base_select_query());
        sqlx::query_as::<_, LeaveRequest>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Leave request not found".into()))
    }

    pub async fn list(
        &self,
        db: &PgPool,
        filter: &LeaveRequestFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<LeaveRequest>, i64), AppError> {
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1=1", TABLE_NAME));
        Self::push_filters(&mut count_builder, filter);
        let total: i64 = count_builder.build_query_scalar().fetch_one(db).await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("{} WHERE 1=1", Self::base_select_query()));
        Self::push_filters(&mut builder, filter);
        builder.push(" ORDER BY requested_at DESC LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page.max(1) - 1) as i64) * limit as i64);
        let rows = builder
            .build_query_as::<LeaveRequest>()
            .fetch_all(db)
            .await?;
        Ok((rows, total))
    }

    fn push_filters(builder: &mut QueryBuilder<Postgres>, filter: &LeaveRequestFilter) {
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.db_value());
        }
        if let Some(employee_num) = &filter.employee_num {
            builder.push(" AND employee_num = ");
            builder.push_bind(employee_num.clone());
        }
        if let Some(year) = filter.year {
            builder.push(" AND year = ");
            builder.push_bind(year);
        }
    }

    pub async fn mark_approved(
        &self,
        conn: &mut PgConnection,
        id: &str,
        approver: &str,
        comment: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {} SET status = $1, approved_by = $2, approved_at = $3, \
             decision_comment = $4, updated_at = $3 WHERE id = $5 AND status = 'pending'",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(RequestStatus::Approved.db_value())
            .bind(approver)
            .bind(timestamp)
            .bind(comment)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_rejected(
        &self,
        conn: &mut PgConnection,
        id: &str,
        approver: &str,
        comment: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {} SET status = $1, rejected_by = $2, rejected_at = $3, \
             decision_comment = $4, updated_at = $3 WHERE id = $5 AND status = 'pending'",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(RequestStatus::Rejected.db_value())
            .bind(approver)
            .bind(timestamp)
            .bind(comment)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// APPROVED back to PENDING, clearing approval metadata.
    pub async fn mark_reverted(
        &self,
        conn: &mut PgConnection,
        id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {} SET status = $1, approved_by = NULL, approved_at = NULL, \
             decision_comment = NULL, updated_at = $2 WHERE id = $3 AND status = 'approved'",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(RequestStatus::Pending.db_value())
            .bind(timestamp)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_cancelled(
        &self,
        conn: &mut PgConnection,
        id: &str,
        employee_num: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let query = format!(
            "UPDATE {} SET status = $1, cancelled_at = $2, updated_at = $2 \
             WHERE id = $3 AND employee_num = $4 AND status = 'pending'",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(RequestStatus::Cancelled.db_value())
            .bind(timestamp)
            .bind(id)
            .bind(employee_num)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Persists the per-year deduction breakdown recorded at approval, so a
    /// revert credits exactly the years that were debited.
    pub async fn insert_deductions(
        &self,
        conn: &mut PgConnection,
        request_id: &str,
        lines: &[DeductionLine],
    ) -> Result<(), AppError> {
        for line in lines {
            let query = format!(
                "INSERT INTO {} (request_id, year, days) VALUES ($1, $2, $3)",
                DEDUCTIONS_TABLE
            );
            sqlx::query(&query)
                .bind(request_id)
                .bind(line.year)
                .bind(line.days)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    pub async fn take_deductions(
        &self,
        conn: &mut PgConnection,
        request_id: &str,
    ) -> Result<Vec<DeductionLine>, AppError> {
        let query = format!(
            "DELETE FROM {} WHERE request_id = $1 RETURNING year, days",
            DEDUCTIONS_TABLE
        );
        let lines = sqlx::query_as::<_, DeductionLine>(&query)
            .bind(request_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(lines)
    }
}

impl Repository<LeaveRequest> for LeaveRequestRepository {
    const TABLE: &'static str = TABLE_NAME;
    type Id = String;

    async fn find_all(&self, db: &PgPool) -> Result<Vec<LeaveRequest>, AppError> {
        let query = format!("{} ORDER BY requested_at DESC", Self::base_select_query());
        let rows = sqlx::query_as::<_, LeaveRequest>(&query)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

    async fn find_by_id(&self, db: &PgPool, id: String) -> Result<LeaveRequest, AppError> {
        let query = format!("{} WHERE id = $1", Self::base_select_query());
        sqlx::query_as::<_, LeaveRequest>(&query)
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Leave request not found".into()))
    }

    async fn create(&self, db: &PgPool, item: &LeaveRequest) -> Result<LeaveRequest, AppError> {
        let query = format!(
            "INSERT INTO {} ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21) RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS, SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, LeaveRequest>(&query)
            .bind(&item.id)
            .bind(&item.employee_num)
            .bind(&item.employee_name)
            .bind(item.year)
            .bind(item.start_date)
            .bind(item.end_date)
            .bind(item.days_requested)
            .bind(item.hours_requested)
            .bind(item.leave_type)
            .bind(&item.reason)
            .bind(item.status)
            .bind(item.requested_at)
            .bind(&item.approved_by)
            .bind(item.approved_at)
            .bind(&item.rejected_by)
            .bind(item.rejected_at)
            .bind(item.cancelled_at)
            .bind(&item.decision_comment)
            .bind(item.hourly_wage)
            .bind(item.cost_estimate)
            .bind(item.updated_at)
            .fetch_one(db)
            .await?;
        Ok(row)
    }

    async fn update(&self, db: &PgPool, item: &LeaveRequest) -> Result<LeaveRequest, AppError> {
        let query = format!(
            "UPDATE {} SET status = $2, approved_by = $3, approved_at = $4, rejected_by = $5, \
             rejected_at = $6, cancelled_at = $7, decision_comment = $8, updated_at = $9 \
             WHERE id = $1 RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, LeaveRequest>(&query)
            .bind(&item.id)
            .bind(item.status)
            .bind(&item.approved_by)
            .bind(item.approved_at)
            .bind(&item.rejected_by)
            .bind(item.rejected_at)
            .bind(item.cancelled_at)
            .bind(&item.decision_comment)
            .bind(item.updated_at)
            .fetch_one(db)
            .await?;
        Ok(row)
    }

    async fn delete(&self, db: &PgPool, id: String) -> Result<(), AppError> {
        let query = format!("DELETE FROM {} WHERE id = $1", TABLE_NAME);
        sqlx::query(&query).bind(id).execute(db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_include_snapshot_fields() {
        assert!(SELECT_COLUMNS.contains("employee_name"));
        assert!(SELECT_COLUMNS.contains("hourly_wage"));
        assert!(SELECT_COLUMNS.contains("cost_estimate"));
    }
}
