use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::{
    config::Config,
    db::connection::DbPool,
    middleware::rate_limit::RateLimitStore,
    services::{employee_cache::EmployeeCache, notifier::Notifier, notifier::TracingNotifier},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,
    pub employee_cache: Arc<EmployeeCache>,
    pub rate_limits: Arc<RateLimitStore>,
    /// Held for the duration of an ingestion run; a second concurrent run
    /// fails `Conflict` instead of queueing.
    pub sync_lock: Arc<AsyncMutex<()>>,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Self {
        Self::with_notifier(pool, config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(pool: DbPool, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        AppState {
            pool,
            config,
            notifier,
            employee_cache: Arc::new(EmployeeCache::new()),
            rate_limits: Arc::new(RateLimitStore::new()),
            sync_lock: Arc::new(AsyncMutex::new(())),
        }
    }
}
