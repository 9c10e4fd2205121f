//! Models describing paid-leave requests and their lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::utils::time::business_days;

/// Hours that make up one statutory workday when converting hourly leave.
pub const HOURS_PER_WORKDAY: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Supported leave request categories.
pub enum LeaveKind {
    /// Whole business days.
    Full,
    /// Half a day per business day in the span.
    Half,
    /// Sub-day leave measured in hours, single-day only.
    Hourly,
    /// Bookkeeping marker for a statutory lapse, not a consumption request.
    ExpiredMarker,
}

impl LeaveKind {
    pub fn db_value(&self) -> &'static str {
        match self {
            LeaveKind::Full => "full",
            LeaveKind::Half => "half",
            LeaveKind::Hourly => "hourly",
            LeaveKind::ExpiredMarker => "expired_marker",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Lifecycle states of a leave request.
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn db_value(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a leave request.
pub struct LeaveRequest {
    /// Surrogate identifier.
    pub id: String,
    /// Ledger key of the employee the leave is drawn for.
    pub employee_num: String,
    /// Name snapshot taken at creation; register renames do not rewrite it.
    pub employee_name: String,
    /// Fiscal year the request draws against.
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_requested: f64,
    /// Present only for hourly leave.
    pub hours_requested: Option<f64>,
    pub leave_type: LeaveKind,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Reviewer notes recorded at approval or rejection.
    pub decision_comment: Option<String>,
    /// Wage snapshot in yen, captured at creation.
    pub hourly_wage: i32,
    /// Estimated cost in yen: days × 8 × wage, or hours × wage.
    pub cost_estimate: i64,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Creates a new request pending approval, capturing the wage snapshot
    /// and the derived cost estimate.
    pub fn new(payload: &CreateLeaveRequest, employee_name: String, hourly_wage: i32) -> Self {
        let now = Utc::now();
        LeaveRequest {
            id: Uuid::new_v4().to_string(),
            employee_num: payload.employee_num.clone(),
            employee_name,
            year: payload.year,
            start_date: payload.start_date,
            end_date: payload.end_date,
            days_requested: payload.days_requested,
            hours_requested: payload.hours_requested,
            leave_type: payload.leave_type,
            reason: payload.reason.clone(),
            status: RequestStatus::Pending,
            requested_at: now,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            cancelled_at: None,
            decision_comment: None,
            hourly_wage,
            cost_estimate: estimate_cost(
                payload.days_requested,
                payload.hours_requested,
                payload.leave_type,
                hourly_wage,
            ),
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, RequestStatus::Pending)
    }
}

/// Cost of the requested leave in yen, from the wage snapshot.
pub fn estimate_cost(days: f64, hours: Option<f64>, kind: LeaveKind, wage: i32) -> i64 {
    let amount = match kind {
        LeaveKind::Hourly => hours.unwrap_or(days * HOURS_PER_WORKDAY) * wage as f64,
        _ => days * HOURS_PER_WORKDAY * wage as f64,
    };
    amount.round() as i64
}

#[derive(Debug, Serialize, Deserialize, Validate)]
/// Payload used to create a new leave request.
#[validate(schema(function = "validate_request_shape"))]
pub struct CreateLeaveRequest {
    #[validate(custom(function = "crate::validation::rules::validate_employee_num"))]
    pub employee_num: String,
    #[validate(range(min = 2000, max = 2100))]
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(range(exclusive_min = 0.0, max = 40.0))]
    pub days_requested: f64,
    #[validate(range(min = 0.0, max = 320.0))]
    pub hours_requested: Option<f64>,
    pub leave_type: LeaveKind,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Cross-field rules: date ordering, and the business-day span each leave
/// type implies for `days_requested`.
fn validate_request_shape(req: &CreateLeaveRequest) -> Result<(), validator::ValidationError> {
    if req.start_date > req.end_date {
        return Err(validator::ValidationError::new("start_date_after_end_date"));
    }
    let span = business_days(req.start_date, req.end_date).len() as f64;
    let expected = match req.leave_type {
        LeaveKind::Full => span,
        LeaveKind::Half => span * 0.5,
        LeaveKind::Hourly => {
            let hours = match req.hours_requested {
                Some(h) if h > 0.0 => h,
                _ => return Err(validator::ValidationError::new("hours_required")),
            };
            // Hourly leave moves in two-hour steps; a six-hour remainder has
            // no legal day quantum, so it cannot be booked.
            if (hours % 2.0).abs() > 1e-9 || (hours % HOURS_PER_WORKDAY - 6.0).abs() < 1e-9 {
                return Err(validator::ValidationError::new("hours_not_bookable"));
            }
            let days = hours / HOURS_PER_WORKDAY;
            if days > span {
                return Err(validator::ValidationError::new("hours_exceed_span"));
            }
            days
        }
        LeaveKind::ExpiredMarker => {
            return Err(validator::ValidationError::new("expired_marker_not_requestable"));
        }
    };
    if (req.days_requested - expected).abs() > 1e-9 {
        return Err(validator::ValidationError::new("days_span_mismatch"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
/// API representation shared with clients.
pub struct LeaveRequestResponse {
    pub id: String,
    pub employee_num: String,
    pub employee_name: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_requested: f64,
    pub hours_requested: Option<f64>,
    pub leave_type: LeaveKind,
    pub reason: Option<String>,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub decision_comment: Option<String>,
    pub cost_estimate: i64,
}

impl From<LeaveRequest> for LeaveRequestResponse {
    fn from(request: LeaveRequest) -> Self {
        LeaveRequestResponse {
            id: request.id,
            employee_num: request.employee_num,
            employee_name: request.employee_name,
            year: request.year,
            start_date: request.start_date,
            end_date: request.end_date,
            days_requested: request.days_requested,
            hours_requested: request.hours_requested,
            leave_type: request.leave_type,
            reason: request.reason,
            status: request.status,
            requested_at: request.requested_at,
            approved_by: request.approved_by,
            approved_at: request.approved_at,
            rejected_by: request.rejected_by,
            rejected_at: request.rejected_at,
            cancelled_at: request.cancelled_at,
            decision_comment: request.decision_comment,
            cost_estimate: request.cost_estimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CreateLeaveRequest {
        CreateLeaveRequest {
            employee_num: "E001".into(),
            year: 2025,
            // 2025-03-10 through 2025-03-12 are Monday to Wednesday.
            start_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            days_requested: 3.0,
            hours_requested: None,
            leave_type: LeaveKind::Full,
            reason: Some("家族旅行".into()),
        }
    }

    #[test]
    fn full_leave_validates_against_business_day_span() {
        assert!(payload().validate().is_ok());

        let mut wrong_span = payload();
        wrong_span.days_requested = 2.0;
        assert!(wrong_span.validate().is_err());
    }

    #[test]
    fn half_day_leave_halves_the_span() {
        let mut half = payload();
        half.leave_type = LeaveKind::Half;
        half.days_requested = 1.5;
        assert!(half.validate().is_ok());
    }

    #[test]
    fn hourly_leave_requires_bookable_hours() {
        let mut hourly = payload();
        hourly.leave_type = LeaveKind::Hourly;
        hourly.end_date = hourly.start_date;
        hourly.hours_requested = Some(2.0);
        hourly.days_requested = 0.25;
        assert!(hourly.validate().is_ok());

        hourly.hours_requested = None;
        assert!(hourly.validate().is_err());

        // Six-hour remainders have no legal day quantum.
        hourly.hours_requested = Some(6.0);
        hourly.days_requested = 0.75;
        assert!(hourly.validate().is_err());

        // Odd hour counts are not bookable either.
        hourly.hours_requested = Some(3.0);
        hourly.days_requested = 0.375;
        assert!(hourly.validate().is_err());
    }

    #[test]
    fn day_bounds_are_enforced() {
        let mut zero = payload();
        zero.days_requested = 0.0;
        assert!(zero.validate().is_err());

        let mut oversized = payload();
        oversized.days_requested = 41.0;
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn inverted_dates_are_rejected() {
        let mut inverted = payload();
        inverted.end_date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn cost_estimate_uses_wage_snapshot() {
        assert_eq!(estimate_cost(3.0, None, LeaveKind::Full, 1500), 36_000);
        assert_eq!(estimate_cost(0.25, Some(2.0), LeaveKind::Hourly, 1500), 3_000);
        assert_eq!(estimate_cost(0.5, None, LeaveKind::Half, 1200), 4_800);
    }

    #[test]
    fn terminal_states_are_rejected_and_cancelled() {
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Approved.is_terminal());
    }
}
