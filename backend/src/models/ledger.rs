//! Models for the per-employee per-fiscal-year leave ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::employee::{EmployeeCategory, EmployeeStatus};

/// One ledger row: the statutory leave account of an employee for one fiscal
/// year. Rows mutate only through the ledger engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmployeeYear {
    pub employee_num: String,
    pub year: i32,
    pub name: String,
    pub category: EmployeeCategory,
    pub work_location: Option<String>,
    /// Days granted for this fiscal year by the Article 39 table.
    pub granted: f64,
    /// Days consumed, including draws made on behalf of later years.
    pub used: f64,
    /// Days transferred in from the previous fiscal year.
    pub carried_in: f64,
    /// Days transferred out to the next fiscal year.
    pub carried_out: f64,
    /// Days lapsed by the statute of limitations or the accumulation cap.
    pub expired: f64,
    pub balance: f64,
    pub hire_date: Option<NaiveDate>,
    pub leave_date: Option<NaiveDate>,
    pub status: EmployeeStatus,
    pub last_updated: DateTime<Utc>,
}

impl EmployeeYear {
    /// The ledger identity every row must satisfy at every read.
    pub fn recomputed_balance(&self) -> f64 {
        self.granted + self.carried_in - self.carried_out - self.used - self.expired
    }

    /// Days still drawable from this year's own grant.
    pub fn own_grant_remaining(&self) -> f64 {
        (self.granted - self.used).max(0.0)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, EmployeeStatus::Active)
    }
}

/// One year's contribution to the newest-first deduction order.
#[derive(Debug, Clone, Serialize)]
pub struct LifoEntry {
    pub year: i32,
    /// 1 for the current year, 2 for carry-over years.
    pub priority: i16,
    pub available: f64,
}

/// Current-year row plus prior-year rows with remaining balance, with the
/// LIFO consumption order and totals.
#[derive(Debug, Serialize)]
pub struct BalanceBreakdown {
    pub employee_num: String,
    pub year: i32,
    pub current: EmployeeYear,
    pub prior: Vec<EmployeeYear>,
    pub lifo_order: Vec<LifoEntry>,
    pub total_available: f64,
}

/// How many days a deduction drew from one year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeductionLine {
    pub year: i32,
    pub days: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> EmployeeYear {
        EmployeeYear {
            employee_num: "E001".into(),
            year: 2025,
            name: "佐藤 花子".into(),
            category: EmployeeCategory::Dispatch,
            work_location: Some("第2ライン".into()),
            granted: 11.0,
            used: 3.0,
            carried_in: 8.0,
            carried_out: 0.0,
            expired: 0.0,
            balance: 16.0,
            hire_date: NaiveDate::from_ymd_opt(2020, 4, 1),
            leave_date: None,
            status: EmployeeStatus::Active,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn recomputed_balance_matches_identity() {
        let row = row();
        assert_eq!(row.recomputed_balance(), 16.0);
    }

    #[test]
    fn own_grant_remaining_never_negative() {
        let mut row = row();
        row.used = 15.0;
        assert_eq!(row.own_grant_remaining(), 0.0);
    }
}
