//! Usage events: dated, typed debits attached to a ledger row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Day quanta a usage event may carry.
pub const VALID_DAY_QUANTA: &[f64] = &[0.0, 0.25, 0.5, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Full,
    Half,
    Hourly,
    /// Statutory lapse record; documents expiry, consumes nothing.
    Expired,
    PaidOut,
}

impl UsageKind {
    pub fn db_value(&self) -> &'static str {
        match self {
            UsageKind::Full => "full",
            UsageKind::Half => "half",
            UsageKind::Hourly => "hourly",
            UsageKind::Expired => "expired",
            UsageKind::PaidOut => "paid_out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    Ingested,
    ApprovedRequest,
    Manual,
}

impl UsageSource {
    pub fn db_value(&self) -> &'static str {
        match self {
            UsageSource::Ingested => "ingested",
            UsageSource::ApprovedRequest => "approved_request",
            UsageSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEvent {
    pub id: String,
    pub employee_num: String,
    pub year: i32,
    pub use_date: NaiveDate,
    pub days_used: f64,
    pub kind: UsageKind,
    pub source: UsageSource,
    /// Set when the event was appended by a request approval.
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(
        employee_num: String,
        year: i32,
        use_date: NaiveDate,
        days_used: f64,
        kind: UsageKind,
        source: UsageSource,
    ) -> Self {
        UsageEvent {
            id: Uuid::new_v4().to_string(),
            employee_num,
            year,
            use_date,
            days_used,
            kind,
            source,
            request_id: None,
            created_at: Utc::now(),
        }
    }

    /// An event is well formed when its quantum is legal and expiry carries
    /// zero days.
    pub fn is_well_formed(&self) -> bool {
        let quantum_ok = VALID_DAY_QUANTA.iter().any(|q| (q - self.days_used).abs() < f64::EPSILON);
        match self.kind {
            UsageKind::Expired => quantum_ok && self.days_used == 0.0,
            _ => quantum_ok && self.days_used > 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: UsageKind, days: f64) -> UsageEvent {
        UsageEvent::new(
            "E001".into(),
            2025,
            NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
            days,
            kind,
            UsageSource::Ingested,
        )
    }

    #[test]
    fn expired_events_must_carry_zero_days() {
        assert!(event(UsageKind::Expired, 0.0).is_well_formed());
        assert!(!event(UsageKind::Expired, 1.0).is_well_formed());
    }

    #[test]
    fn consuming_events_reject_zero_and_odd_quanta() {
        assert!(event(UsageKind::Full, 1.0).is_well_formed());
        assert!(event(UsageKind::Hourly, 0.25).is_well_formed());
        assert!(!event(UsageKind::Full, 0.0).is_well_formed());
        assert!(!event(UsageKind::Half, 0.3).is_well_formed());
    }
}
