//! User directory repository.

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::user::User;

const TABLE_NAME: &str = "users";
const SELECT_COLUMNS: &str =
    "id, username, password_hash, full_name, role, employee_num, created_at, updated_at";

#[derive(Debug, Default, Clone, Copy)]
pub struct UserRepository;

impl UserRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn find_by_username(
        &self,
        db: &PgPool,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE username = $1",
            SELECT_COLUMNS, TABLE_NAME
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, db: &PgPool, id: &str) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM {} WHERE id = $1", SELECT_COLUMNS, TABLE_NAME);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn create(&self, db: &PgPool, user: &User) -> Result<User, AppError> {
        let query = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS, SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, User>(&query)
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(user.role)
            .bind(&user.employee_num)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(db)
            .await?;
        Ok(row)
    }

    pub async fn count(&self, db: &PgPool) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE_NAME))
            .fetch_one(db)
            .await?;
        Ok(count)
    }

    /// Production boot scans for credentials that are not modern PHC hashes
    /// and refuses to serve if any exist.
    pub async fn count_legacy_credentials(&self, db: &PgPool) -> Result<i64, AppError> {
        let query = format!(
            "SELECT COUNT(*) FROM {} WHERE password_hash NOT LIKE '$%'",
            TABLE_NAME
        );
        let count: i64 = sqlx::query_scalar(&query).fetch_one(db).await?;
        Ok(count)
    }
}
