//! Models for the three employment-category registers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Employment category; each category has its own register table.
pub enum EmployeeCategory {
    Dispatch,
    Contract,
    Staff,
}

impl EmployeeCategory {
    pub fn db_value(&self) -> &'static str {
        match self {
            EmployeeCategory::Dispatch => "dispatch",
            EmployeeCategory::Contract => "contract",
            EmployeeCategory::Staff => "staff",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EmployeeCategory::Dispatch => "dispatch_employees",
            EmployeeCategory::Contract => "contract_employees",
            EmployeeCategory::Staff => "staff_employees",
        }
    }
}

impl std::str::FromStr for EmployeeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatch" => Ok(EmployeeCategory::Dispatch),
            "contract" => Ok(EmployeeCategory::Contract),
            "staff" => Ok(EmployeeCategory::Staff),
            other => Err(format!("unknown employee category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    Retired,
    Suspended,
}

impl EmployeeStatus {
    pub fn db_value(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::Retired => "retired",
            EmployeeStatus::Suspended => "suspended",
        }
    }
}

/// Unified read model across the three register tables, used by listing,
/// search and the wage lookup at request creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmployeeRecord {
    pub employee_num: String,
    pub name: String,
    pub category: EmployeeCategory,
    pub work_location: Option<String>,
    pub hourly_wage: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub leave_date: Option<NaiveDate>,
    pub status: EmployeeStatus,
    pub updated_at: DateTime<Utc>,
}

impl EmployeeRecord {
    pub fn is_active(&self) -> bool {
        matches!(self.status, EmployeeStatus::Active)
    }
}

/// Upsert payload produced by register ingestion. Category-specific columns
/// stay optional; the repository writes only what the category's table holds.
#[derive(Debug, Clone)]
pub struct RegisterUpsert {
    pub category: EmployeeCategory,
    pub employee_num: String,
    pub name: String,
    pub dispatch_name: Option<String>,
    pub department: Option<String>,
    pub business: Option<String>,
    pub office: Option<String>,
    pub work_location: Option<String>,
    pub hourly_wage: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub leave_date: Option<NaiveDate>,
}

impl RegisterUpsert {
    pub fn new(category: EmployeeCategory, employee_num: String, name: String) -> Self {
        RegisterUpsert {
            category,
            employee_num,
            name,
            dispatch_name: None,
            department: None,
            business: None,
            office: None,
            work_location: None,
            hourly_wage: None,
            birth_date: None,
            nationality: None,
            hire_date: None,
            leave_date: None,
        }
    }

    /// A register row with a leave date in the past is no longer active.
    pub fn status(&self) -> EmployeeStatus {
        if self.leave_date.is_some() {
            EmployeeStatus::Retired
        } else {
            EmployeeStatus::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_serde_snake_case() {
        let c: EmployeeCategory = serde_json::from_str("\"dispatch\"").unwrap();
        assert_eq!(c, EmployeeCategory::Dispatch);
        let v = serde_json::to_value(EmployeeCategory::Staff).unwrap();
        assert_eq!(v, serde_json::json!("staff"));
    }

    #[test]
    fn upsert_status_follows_leave_date() {
        let mut record = RegisterUpsert::new(
            EmployeeCategory::Contract,
            "C-100".into(),
            "山田 太郎".into(),
        );
        assert_eq!(record.status(), EmployeeStatus::Active);
        record.leave_date = NaiveDate::from_ymd_opt(2024, 9, 30);
        assert_eq!(record.status(), EmployeeStatus::Retired);
    }
}
