use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Type alias so downstream code can reference the logical database pool in a single place.
pub type DbPool = PgPool;

/// Pool sized for a client-server engine: bounded concurrency against the
/// database, with a short acquire deadline so exhausted pools surface as
/// `ServiceUnavailable` instead of hanging handlers.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.clamp(10, 20))
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}
