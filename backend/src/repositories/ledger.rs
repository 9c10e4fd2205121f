//! Employee-year ledger repository.
//!
//! Row mutations here are invoked only from the ledger engine, inside the
//! engine's transactions.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use crate::error::AppError;
use crate::models::employee::{EmployeeCategory, EmployeeStatus};
use crate::models::ledger::EmployeeYear;

const TABLE_NAME: &str = "employee_years";
const SELECT_COLUMNS: &str = "employee_num, year, name, category, work_location, granted, used, \
carried_in, carried_out, expired, balance, hire_date, leave_date, status, last_updated";

/// Candidate row for the five-day compliance scan, with the effective
/// carry-in resolved against the previous-year row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ComplianceCandidate {
    pub employee_num: String,
    pub name: String,
    pub category: EmployeeCategory,
    pub status: EmployeeStatus,
    pub granted: f64,
    pub used: f64,
    pub carry_in_effective: f64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerRepository;

impl LedgerRepository {
    pub fn new() -> Self {
        Self
    }

    fn base_select_query() -> String {
        format!("SELECT {} FROM {}", SELECT_COLUMNS, TABLE_NAME)
    }

    pub async fn find_year(
        &self,
        db: &PgPool,
        employee_num: &str,
        year: i32,
    ) -> Result<EmployeeYear, AppError> {
        let query = format!(
            "{} WHERE employee_num = $1 AND year = $2",
            Self::base_select_query()
        );
        sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(employee_num)
            .bind(year)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No ledger row for {} in {}", employee_num, year))
            })
    }

    pub async fn find_years_for_employee(
        &self,
        db: &PgPool,
        employee_num: &str,
    ) -> Result<Vec<EmployeeYear>, AppError> {
        let query = format!(
            "{} WHERE employee_num = $1 ORDER BY year DESC",
            Self::base_select_query()
        );
        let rows = sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(employee_num)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

    /// Prior-year rows with remaining balance inside the carry-over window,
    /// newest first.
    pub async fn find_prior_with_balance(
        &self,
        db: &PgPool,
        employee_num: &str,
        current_year: i32,
        window_years: i32,
    ) -> Result<Vec<EmployeeYear>, AppError> {
        let query = format!(
            "{} WHERE employee_num = $1 AND year < $2 AND year >= $3 AND balance > 0 \
             ORDER BY year DESC",
            Self::base_select_query()
        );
        let rows = sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(employee_num)
            .bind(current_year)
            .bind(current_year - window_years)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

    /// Locks the current-year row and its carry-window predecessors for the
    /// duration of a deduction transaction.
    pub async fn lock_deduction_rows(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        current_year: i32,
        window_years: i32,
    ) -> Result<Vec<EmployeeYear>, AppError> {
        let query = format!(
            "{} WHERE employee_num = $1 AND year <= $2 AND year >= $3 \
             ORDER BY year DESC FOR UPDATE",
            Self::base_select_query()
        );
        let rows = sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(employee_num)
            .bind(current_year)
            .bind(current_year - window_years)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Applies one deduction draw: `used` rises, `balance` falls.
    pub async fn apply_draw(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        year: i32,
        days: f64,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET used = used + $1, balance = balance - $1, last_updated = $2 \
             WHERE employee_num = $3 AND year = $4",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(days)
            .bind(Utc::now())
            .bind(employee_num)
            .bind(year)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() != 1 {
            return Err(AppError::Conflict(format!(
                "Ledger row {}/{} vanished mid-transaction",
                employee_num, year
            )));
        }
        Ok(())
    }

    /// Reverses a draw made by [`apply_draw`].
    pub async fn apply_credit(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        year: i32,
        days: f64,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET used = used - $1, balance = balance + $1, last_updated = $2 \
             WHERE employee_num = $3 AND year = $4 AND used >= $1",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(days)
            .bind(Utc::now())
            .bind(employee_num)
            .bind(year)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() != 1 {
            return Err(AppError::Conflict(format!(
                "Cannot credit {} days back to {}/{}",
                days, employee_num, year
            )));
        }
        Ok(())
    }

    /// Re-reads one row inside the transaction for the post-write balance
    /// assertion.
    pub async fn reload_for_check(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        year: i32,
    ) -> Result<EmployeeYear, AppError> {
        let query = format!(
            "{} WHERE employee_num = $1 AND year = $2",
            Self::base_select_query()
        );
        sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(employee_num)
            .bind(year)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Ledger row {}/{} vanished mid-transaction",
                    employee_num, year
                ))
            })
    }

    /// Active rows with remaining balance in one year, locked for carry-over.
    pub async fn lock_rows_with_balance(
        &self,
        conn: &mut PgConnection,
        year: i32,
    ) -> Result<Vec<EmployeeYear>, AppError> {
        let query = format!(
            "{} WHERE year = $1 AND balance > 0 ORDER BY employee_num FOR UPDATE",
            Self::base_select_query()
        );
        let rows = sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(year)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Rows whose balance outlived the carry-over window, locked for expiry.
    pub async fn lock_rows_with_balance_at_or_before(
        &self,
        conn: &mut PgConnection,
        year: i32,
    ) -> Result<Vec<EmployeeYear>, AppError> {
        let query = format!(
            "{} WHERE year <= $1 AND balance > 0 ORDER BY employee_num, year FOR UPDATE",
            Self::base_select_query()
        );
        let rows = sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(year)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Closes a carry-over source row: records the transfer and the lapse,
    /// zeroes the balance.
    pub async fn close_carry_source(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        year: i32,
        transfer: f64,
        lapse: f64,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {} SET carried_out = carried_out + $1, expired = expired + $2, \
             balance = 0, last_updated = $3 WHERE employee_num = $4 AND year = $5",
            TABLE_NAME
        );
        let result = sqlx::query(&query)
            .bind(transfer)
            .bind(lapse)
            .bind(Utc::now())
            .bind(employee_num)
            .bind(year)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() != 1 {
            return Err(AppError::Conflict(format!(
                "Carry-over source {}/{} vanished mid-transaction",
                employee_num, year
            )));
        }
        Ok(())
    }

    /// Moves the whole remaining balance of an aged row into `expired`.
    pub async fn expire_row(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        year: i32,
    ) -> Result<f64, AppError> {
        let query = format!(
            "UPDATE {} SET expired = expired + balance, balance = 0, last_updated = $1 \
             WHERE employee_num = $2 AND year = $3 AND balance > 0 RETURNING expired",
            TABLE_NAME
        );
        let expired: (f64,) = sqlx::query_as(&query)
            .bind(Utc::now())
            .bind(employee_num)
            .bind(year)
            .fetch_one(&mut *conn)
            .await?;
        Ok(expired.0)
    }

    /// Creates the carry-over target row or refreshes its grant and carry-in.
    /// Setting (not adding) `carried_in` keeps carry-over idempotent.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_carry_target(
        &self,
        conn: &mut PgConnection,
        source: &EmployeeYear,
        year: i32,
        granted: f64,
        carried_in: f64,
    ) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO {} (employee_num, year, name, category, work_location, granted, used, \
             carried_in, carried_out, expired, balance, hire_date, leave_date, status, last_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, 0, 0, $6 + $7, $8, $9, $10, $11) \
             ON CONFLICT (employee_num, year) DO UPDATE SET \
             granted = $6, carried_in = $7, \
             balance = $6 + $7 - {table}.used - {table}.carried_out - {table}.expired, \
             last_updated = $11",
            TABLE_NAME,
            table = TABLE_NAME
        );
        sqlx::query(&query)
            .bind(&source.employee_num)
            .bind(year)
            .bind(&source.name)
            .bind(source.category)
            .bind(&source.work_location)
            .bind(granted)
            .bind(carried_in)
            .bind(source.hire_date)
            .bind(source.leave_date)
            .bind(source.status)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Upserts a row from ingestion: granted is authoritative from the sheet,
    /// used/balance are reconciled by the caller afterwards.
    pub async fn upsert_ingested_year(
        &self,
        conn: &mut PgConnection,
        row: &EmployeeYear,
    ) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO {} (employee_num, year, name, category, work_location, granted, used, \
             carried_in, carried_out, expired, balance, hire_date, leave_date, status, last_updated) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (employee_num, year) DO UPDATE SET \
             name = $3, category = $4, work_location = $5, granted = $6, \
             hire_date = $12, leave_date = $13, status = $14, last_updated = $15",
            TABLE_NAME
        );
        sqlx::query(&query)
            .bind(&row.employee_num)
            .bind(row.year)
            .bind(&row.name)
            .bind(row.category)
            .bind(&row.work_location)
            .bind(row.granted)
            .bind(row.used)
            .bind(row.carried_in)
            .bind(row.carried_out)
            .bind(row.expired)
            .bind(row.balance)
            .bind(row.hire_date)
            .bind(row.leave_date)
            .bind(row.status)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Recomputes `used` and `balance` from the row's usage events; called at
    /// the end of an ingestion transaction for each touched row.
    pub async fn reconcile_from_events(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        year: i32,
    ) -> Result<(), AppError> {
        let query = format!(
            "UPDATE {table} SET \
             used = COALESCE((SELECT SUM(days_used) FROM usage_events \
                              WHERE employee_num = $1 AND year = $2 AND kind <> 'expired'), 0), \
             balance = granted + carried_in - carried_out - expired \
                       - COALESCE((SELECT SUM(days_used) FROM usage_events \
                                   WHERE employee_num = $1 AND year = $2 AND kind <> 'expired'), 0), \
             last_updated = $3 \
             WHERE employee_num = $1 AND year = $2",
            table = TABLE_NAME
        );
        sqlx::query(&query)
            .bind(employee_num)
            .bind(year)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Deletes rows past the retention horizon, returning them so the caller
    /// can audit each purge. Cascades to usage events; rows referenced by
    /// open requests make the transaction fail by trigger.
    pub async fn purge_older_than(
        &self,
        conn: &mut PgConnection,
        cutoff_year: i32,
    ) -> Result<Vec<EmployeeYear>, AppError> {
        let query = format!(
            "DELETE FROM {} WHERE year < $1 RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EmployeeYear>(&query)
            .bind(cutoff_year)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows)
    }

    /// Enumerates five-day-rule candidates for one year.
    ///
    /// Joins the previous-year row so the combined availability is computed
    /// from granted + carry-in, falling back to the predecessor's remaining
    /// balance (capped by the accumulation ceiling) when carry-over has not
    /// populated `carried_in` yet.
    pub async fn compliance_candidates(
        &self,
        db: &PgPool,
        year: i32,
        obligation_threshold: f64,
        max_accumulated_days: f64,
    ) -> Result<Vec<ComplianceCandidate>, AppError> {
        let query = format!(
            "SELECT cur.employee_num, cur.name, cur.category, cur.status, cur.granted, cur.used, \
             CASE WHEN cur.carried_in > 0 THEN cur.carried_in \
                  ELSE LEAST(COALESCE(prev.balance, 0), $3 - cur.granted) END AS carry_in_effective \
             FROM {table} cur \
             LEFT JOIN {table} prev \
               ON prev.employee_num = cur.employee_num AND prev.year = cur.year - 1 \
             WHERE cur.year = $1 \
               AND cur.granted + (CASE WHEN cur.carried_in > 0 THEN cur.carried_in \
                    ELSE LEAST(COALESCE(prev.balance, 0), $3 - cur.granted) END) >= $2 \
             ORDER BY cur.employee_num",
            table = TABLE_NAME
        );
        let rows = sqlx::query_as::<_, ComplianceCandidate>(&query)
            .bind(year)
            .bind(obligation_threshold)
            .bind(max_accumulated_days)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_columns_cover_the_ledger_identity_terms() {
        for column in ["granted", "used", "carried_in", "carried_out", "expired", "balance"] {
            assert!(SELECT_COLUMNS.contains(column), "missing {}", column);
        }
    }
}
