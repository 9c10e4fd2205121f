//! Read-through cache for employee listings, tagged by fiscal year.
//!
//! Invalidation is explicit: any ingest or ledger mutation touching a year
//! drops that year's entries (and the year-less ones). A short TTL bounds
//! staleness if an invalidation is ever missed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::employee::EmployeeRecord;

const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListCacheKey {
    pub year: Option<i32>,
    pub category: Option<String>,
    pub active: Option<bool>,
    pub q: Option<String>,
    pub page: u32,
    pub limit: u32,
}

struct CacheEntry {
    inserted_at: Instant,
    rows: Vec<EmployeeRecord>,
    total: i64,
}

#[derive(Default)]
pub struct EmployeeCache {
    inner: Mutex<HashMap<ListCacheKey, CacheEntry>>,
}

impl EmployeeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ListCacheKey) -> Option<(Vec<EmployeeRecord>, i64)> {
        let store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = store.get(key)?;
        if entry.inserted_at.elapsed() > CACHE_TTL {
            return None;
        }
        Some((entry.rows.clone(), entry.total))
    }

    pub fn put(&self, key: ListCacheKey, rows: Vec<EmployeeRecord>, total: i64) {
        let mut store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        store.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                rows,
                total,
            },
        );
    }

    /// Drops entries touching `year`, including year-less listings that may
    /// contain rows from it.
    pub fn invalidate_year(&self, year: i32) {
        let mut store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        store.retain(|key, _| key.year.is_some() && key.year != Some(year));
    }

    pub fn invalidate_all(&self) {
        let mut store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::employee::{EmployeeCategory, EmployeeStatus};
    use chrono::Utc;

    fn key(year: Option<i32>) -> ListCacheKey {
        ListCacheKey {
            year,
            category: None,
            active: None,
            q: None,
            page: 1,
            limit: 50,
        }
    }

    fn record() -> EmployeeRecord {
        EmployeeRecord {
            employee_num: "E001".into(),
            name: "佐藤".into(),
            category: EmployeeCategory::Dispatch,
            work_location: None,
            hourly_wage: Some(1450),
            birth_date: None,
            nationality: None,
            hire_date: None,
            leave_date: None,
            status: EmployeeStatus::Active,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn round_trip_and_year_invalidation() {
        let cache = EmployeeCache::new();
        cache.put(key(Some(2025)), vec![record()], 1);
        cache.put(key(Some(2024)), vec![record()], 1);
        cache.put(key(None), vec![record()], 1);
        assert!(cache.get(&key(Some(2025))).is_some());

        cache.invalidate_year(2025);
        assert!(cache.get(&key(Some(2025))).is_none());
        // Year-less listings may contain the mutated year; they go too.
        assert!(cache.get(&key(None)).is_none());
        assert!(cache.get(&key(Some(2024))).is_some());
    }

    #[test]
    fn invalidate_all_empties_the_store() {
        let cache = EmployeeCache::new();
        cache.put(key(Some(2025)), vec![record()], 1);
        cache.invalidate_all();
        assert!(cache.get(&key(Some(2025))).is_none());
    }
}
