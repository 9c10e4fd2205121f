//! Append-only audit log repository. Inserts only; the schema rejects
//! UPDATE and DELETE by trigger.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::models::audit_log::{AuditAction, AuditLog};

const TABLE_NAME: &str = "audit_logs";
const SELECT_COLUMNS: &str = "id, occurred_at, actor, action, entity_kind, entity_id, \
before_value, after_value, source_ip, user_agent, extra";

/// Hard ceiling on rows returned by the CSV export path.
pub const EXPORT_ROW_CAP: i64 = 50_000;

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub action: Option<AuditAction>,
    pub entity_kind: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AuditLogRepository;

impl AuditLogRepository {
    pub fn new() -> Self {
        Self
    }

    /// Inserts inside the caller's transaction so the entry becomes visible
    /// atomically with the mutation it records.
    pub async fn insert(&self, conn: &mut PgConnection, entry: &AuditLog) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            TABLE_NAME, SELECT_COLUMNS
        );
        sqlx::query(&query)
            .bind(&entry.id)
            .bind(entry.occurred_at)
            .bind(&entry.actor)
            .bind(entry.action)
            .bind(&entry.entity_kind)
            .bind(&entry.entity_id)
            .bind(&entry.before_value)
            .bind(&entry.after_value)
            .bind(&entry.source_ip)
            .bind(&entry.user_agent)
            .bind(&entry.extra)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        db: &PgPool,
        filter: &AuditLogFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<AuditLog>, i64), AppError> {
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1=1", TABLE_NAME));
        Self::push_filters(&mut count_builder, filter);
        let total: i64 = count_builder.build_query_scalar().fetch_one(db).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE 1=1",
            SELECT_COLUMNS, TABLE_NAME
        ));
        Self::push_filters(&mut builder, filter);
        builder.push(" ORDER BY occurred_at DESC LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(((page.max(1) - 1) as i64) * limit as i64);
        let rows = builder.build_query_as::<AuditLog>().fetch_all(db).await?;
        Ok((rows, total))
    }

    /// Bounded export query for the CSV endpoint.
    pub async fn export(
        &self,
        db: &PgPool,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLog>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE 1=1",
            SELECT_COLUMNS, TABLE_NAME
        ));
        Self::push_filters(&mut builder, filter);
        builder.push(" ORDER BY occurred_at DESC LIMIT ");
        builder.push_bind(EXPORT_ROW_CAP);
        let rows = builder.build_query_as::<AuditLog>().fetch_all(db).await?;
        Ok(rows)
    }

    fn push_filters(builder: &mut QueryBuilder<Postgres>, filter: &AuditLogFilter) {
        if let Some(action) = filter.action {
            builder.push(" AND action = ");
            builder.push_bind(action.db_value());
        }
        if let Some(entity_kind) = &filter.entity_kind {
            builder.push(" AND entity_kind = ");
            builder.push_bind(entity_kind.clone());
        }
        if let Some(from) = filter.from {
            builder.push(" AND occurred_at >= ");
            builder.push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND occurred_at <= ");
            builder.push_bind(to);
        }
    }
}
