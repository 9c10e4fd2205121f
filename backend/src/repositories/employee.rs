//! Register repositories for the three employment categories.

use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::models::employee::{EmployeeCategory, EmployeeRecord, RegisterUpsert};

/// Unified projection across the three register tables. Each SELECT lists
/// the same columns so the UNION keeps one shape.
const UNIFIED_SELECT: &str = "\
SELECT employee_num, name, 'dispatch' AS category, work_location, hourly_wage, birth_date, \
nationality, hire_date, leave_date, status, updated_at FROM dispatch_employees \
UNION ALL \
SELECT employee_num, name, 'contract' AS category, work_location, hourly_wage, birth_date, \
nationality, hire_date, leave_date, status, updated_at FROM contract_employees \
UNION ALL \
SELECT employee_num, name, 'staff' AS category, work_location, hourly_wage, birth_date, \
nationality, hire_date, leave_date, status, updated_at FROM staff_employees";

#[derive(Debug, Clone)]
pub struct EmployeeListFilter {
    pub year: Option<i32>,
    pub category: Option<EmployeeCategory>,
    pub active: Option<bool>,
    pub q: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmployeeRepository;

impl EmployeeRepository {
    pub fn new() -> Self {
        Self
    }

    /// Upserts a register record into its category table, keyed on
    /// `employee_num` so re-ingestion converges.
    pub async fn upsert(
        &self,
        conn: &mut PgConnection,
        record: &RegisterUpsert,
    ) -> Result<(), AppError> {
        let extra_column = match record.category {
            EmployeeCategory::Dispatch => "dispatch_name",
            EmployeeCategory::Contract => "business",
            EmployeeCategory::Staff => "office",
        };
        let extra_value = match record.category {
            EmployeeCategory::Dispatch => &record.dispatch_name,
            EmployeeCategory::Contract => &record.business,
            EmployeeCategory::Staff => &record.office,
        };
        let query = format!(
            "INSERT INTO {table} (employee_num, name, {extra}, work_location, hourly_wage, \
             birth_date, nationality, hire_date, leave_date, status, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (employee_num) DO UPDATE SET \
             name = $2, {extra} = $3, work_location = $4, hourly_wage = $5, birth_date = $6, \
             nationality = $7, hire_date = $8, leave_date = $9, status = $10, updated_at = $11",
            table = record.category.table(),
            extra = extra_column
        );
        sqlx::query(&query)
            .bind(&record.employee_num)
            .bind(&record.name)
            .bind(extra_value)
            .bind(&record.work_location)
            .bind(record.hourly_wage)
            .bind(record.birth_date)
            .bind(&record.nationality)
            .bind(record.hire_date)
            .bind(record.leave_date)
            .bind(record.status().db_value())
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Bulk lookup for ingestion: one query for every employee number in the
    /// batch instead of a per-row probe.
    pub async fn find_records_by_nums(
        &self,
        db: &PgPool,
        employee_nums: &[String],
    ) -> Result<Vec<EmployeeRecord>, AppError> {
        if employee_nums.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT * FROM ({}) registers WHERE employee_num = ANY($1)",
            UNIFIED_SELECT
        );
        let rows = sqlx::query_as::<_, EmployeeRecord>(&query)
            .bind(employee_nums)
            .fetch_all(db)
            .await?;
        Ok(rows)
    }

    /// Single indexed lookup against the unified register view; request
    /// creation takes its wage snapshot from this, never from a table scan.
    pub async fn find_record(
        &self,
        db: &PgPool,
        employee_num: &str,
    ) -> Result<Option<EmployeeRecord>, AppError> {
        let query = format!(
            "SELECT * FROM ({}) registers WHERE employee_num = $1 LIMIT 1",
            UNIFIED_SELECT
        );
        let record = sqlx::query_as::<_, EmployeeRecord>(&query)
            .bind(employee_num)
            .fetch_optional(db)
            .await?;
        Ok(record)
    }

    /// Paginated, filtered listing across the registers.
    pub async fn list(
        &self,
        db: &PgPool,
        filter: &EmployeeListFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<EmployeeRecord>, i64), AppError> {
        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM ({}) registers WHERE 1=1",
            UNIFIED_SELECT
        ));
        Self::push_filters(&mut count_builder, filter);
        let total: i64 = count_builder.build_query_scalar().fetch_one(db).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT * FROM ({}) registers WHERE 1=1",
            UNIFIED_SELECT
        ));
        Self::push_filters(&mut builder, filter);
        builder.push(" ORDER BY employee_num LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page.max(1) - 1) as i64) * limit as i64);

        let rows = builder
            .build_query_as::<EmployeeRecord>()
            .fetch_all(db)
            .await?;
        Ok((rows, total))
    }

    fn push_filters(builder: &mut QueryBuilder<Postgres>, filter: &EmployeeListFilter) {
        if let Some(category) = filter.category {
            builder.push(" AND category = ");
            builder.push_bind(category.db_value());
        }
        if let Some(active) = filter.active {
            if active {
                builder.push(" AND status = 'active'");
            } else {
                builder.push(" AND status <> 'active'");
            }
        }
        if let Some(year) = filter.year {
            builder.push(
                " AND EXISTS (SELECT 1 FROM employee_years ey \
                 WHERE ey.employee_num = registers.employee_num AND ey.year = ",
            );
            builder.push_bind(year);
            builder.push(")");
        }
        if let Some(q) = filter.q.as_deref().filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q);
            builder.push(" AND (name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR work_location ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
    }

    /// Full-text search over name and location, trigram-indexed.
    pub async fn search(
        &self,
        db: &PgPool,
        q: &str,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<EmployeeRecord>, i64), AppError> {
        let filter = EmployeeListFilter {
            year: None,
            category: None,
            active: None,
            q: Some(q.to_string()),
        };
        self.list(db, &filter, page, limit).await
    }
}
