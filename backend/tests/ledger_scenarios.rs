//! End-to-end ledger scenarios exercised through the engine's pure core:
//! grant lookup, LIFO deduction, carry-over arithmetic and the five-day
//! classification.

use chrono::{NaiveDate, Utc};

use yukyu_backend::error::AppError;
use yukyu_backend::models::employee::{EmployeeCategory, EmployeeStatus};
use yukyu_backend::models::fiscal::{grant_days_for_seniority, FiscalPolicy};
use yukyu_backend::models::ledger::{DeductionLine, EmployeeYear};
use yukyu_backend::models::leave_request::{CreateLeaveRequest, LeaveKind, LeaveRequest};
use yukyu_backend::repositories::ledger::ComplianceCandidate;
use yukyu_backend::services::ledger::{
    classify_compliance, lifo_order, plan_deduction, ComplianceClass,
};
use yukyu_backend::services::workflow::plan_usage_events;
use yukyu_backend::utils::time::{
    fiscal_period_end, fiscal_year_of, seniority_half_years,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn year_row(
    employee_num: &str,
    year: i32,
    granted: f64,
    used: f64,
    carried_in: f64,
) -> EmployeeYear {
    EmployeeYear {
        employee_num: employee_num.to_string(),
        year,
        name: "テスト社員".into(),
        category: EmployeeCategory::Dispatch,
        work_location: None,
        granted,
        used,
        carried_in,
        carried_out: 0.0,
        expired: 0.0,
        balance: granted + carried_in - used,
        hire_date: Some(date(2018, 7, 1)),
        leave_date: None,
        status: EmployeeStatus::Active,
        last_updated: Utc::now(),
    }
}

#[test]
fn grant_lookup_for_seven_years_of_seniority() {
    // hire 2018-07-01, as-of 2025-07-01: seniority 7.0, granted 20.
    let seniority = seniority_half_years(date(2018, 7, 1), date(2025, 7, 1)).unwrap();
    assert_eq!(seniority, 7.0);
    assert_eq!(grant_days_for_seniority(seniority).unwrap(), 20.0);
}

#[test]
fn lifo_deduction_spans_two_years() {
    // (E001, 2024, granted=10) + (E001, 2025, granted=11, carried_in=8);
    // deduct 15 in 2025 -> 11 from 2025, 4 from 2024.
    let current = year_row("E001", 2025, 11.0, 0.0, 8.0);
    let prior = vec![year_row("E001", 2024, 10.0, 0.0, 0.0)];

    let plan = plan_deduction(&current, &prior, 15.0).unwrap();
    assert_eq!(
        plan,
        vec![
            DeductionLine { year: 2025, days: 11.0 },
            DeductionLine { year: 2024, days: 4.0 },
        ]
    );
    let total: f64 = plan.iter().map(|l| l.days).sum();
    assert_eq!(total, 15.0);
}

#[test]
fn insufficient_balance_reports_the_delta_and_changes_nothing() {
    let current = year_row("E001", 2025, 11.0, 0.0, 8.0);
    let prior = vec![year_row("E001", 2024, 10.0, 0.0, 0.0)];

    match plan_deduction(&current, &prior, 25.0) {
        Err(AppError::InsufficientBalance {
            available,
            requested,
        }) => {
            assert_eq!(available, 19.0);
            assert_eq!(requested, 25.0);
        }
        other => panic!("expected insufficient_balance, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn carry_over_cap_arithmetic_matches_the_statute() {
    // balance 30 carried into a year granting 20 under a 40-day cap:
    // transfer 20, lapse 10.
    let policy = FiscalPolicy::default();
    let balance: f64 = 30.0;
    let granted_new: f64 = 20.0;
    let transfer = balance.min(policy.max_accumulated_days - granted_new);
    let lapse = balance - transfer;
    assert_eq!(transfer, 20.0);
    assert_eq!(lapse, 10.0);
}

#[test]
fn expiry_horizon_is_two_years() {
    // Running carry-over into 2025, a 2022 row with remaining balance is
    // older than 2025 - 2 = 2023 and lapses entirely, dated its own
    // period end.
    let policy = FiscalPolicy::default();
    let horizon = 2025 - policy.max_carry_over_years;
    assert!(2022 < horizon || 2022 == horizon);
    assert_eq!(fiscal_period_end(2022, &policy), date(2022, 12, 20));
}

#[test]
fn lifo_order_totals_match_the_current_balance() {
    let current = year_row("E001", 2025, 11.0, 3.0, 8.0);
    let prior = vec![
        year_row("E001", 2024, 10.0, 2.0, 0.0),
        year_row("E001", 2023, 10.0, 9.0, 0.0),
    ];
    let order = lifo_order(&current, &prior);
    assert_eq!(order[0].priority, 1);
    assert!(order.iter().skip(1).all(|e| e.priority == 2));
    // Years descend within the carry-over block.
    let years: Vec<i32> = order.iter().map(|e| e.year).collect();
    assert_eq!(years[0], 2025);
    assert!(years.windows(2).all(|w| w[0] > w[1]));
    let total: f64 = order.iter().map(|e| e.available).sum();
    assert_eq!(total, current.balance);
}

#[test]
fn cross_year_approval_events_cover_the_lifo_breakdown_exactly() {
    // The scenario-2 draw, carried through approval: deduct(E001, 15, 2025)
    // yields [(2025, 11), (2024, 4)], and the approval's usage events must
    // carry those years, not the request year.
    let current = year_row("E001", 2025, 11.0, 0.0, 8.0);
    let prior = vec![year_row("E001", 2024, 10.0, 0.0, 0.0)];
    let breakdown = plan_deduction(&current, &prior, 15.0).unwrap();

    // 2025-03-03 through 2025-03-21 covers exactly 15 business days.
    let payload = CreateLeaveRequest {
        employee_num: "E001".into(),
        year: 2025,
        start_date: date(2025, 3, 3),
        end_date: date(2025, 3, 21),
        days_requested: 15.0,
        hours_requested: None,
        leave_type: LeaveKind::Full,
        reason: None,
    };
    let request = LeaveRequest::new(&payload, "テスト社員".into(), 1500);
    let events = plan_usage_events(&request, &breakdown).unwrap();

    assert_eq!(events.len(), 15);
    for line in &breakdown {
        let event_sum: f64 = events
            .iter()
            .filter(|e| e.year == line.year)
            .map(|e| e.days_used)
            .sum();
        assert_eq!(event_sum, line.days, "events must match year {}", line.year);
    }
    // No event references a year outside the breakdown.
    assert!(events
        .iter()
        .all(|e| breakdown.iter().any(|line| line.year == e.year)));

    // Reconciliation equivalence: recomputing `used` from each row's events
    // (what the ingestion reconcile does) reproduces the draw that the
    // deduction wrote, on both the current and the carry-over row.
    let used_2025: f64 = events.iter().filter(|e| e.year == 2025).map(|e| e.days_used).sum();
    let used_2024: f64 = events.iter().filter(|e| e.year == 2024).map(|e| e.days_used).sum();
    assert_eq!(used_2025, 11.0);
    assert_eq!(used_2024, 4.0);
}

#[test]
fn five_day_rule_uses_combined_availability() {
    // granted=8 alone is under the 10-day threshold, but 8 + 2 carried
    // puts the employee in scope; used=5 satisfies the obligation.
    let policy = FiscalPolicy::default();
    let candidate = ComplianceCandidate {
        employee_num: "E010".into(),
        name: "鈴木".into(),
        category: EmployeeCategory::Contract,
        status: EmployeeStatus::Active,
        granted: 8.0,
        used: 5.0,
        carry_in_effective: 2.0,
    };
    assert!(candidate.granted + candidate.carry_in_effective >= policy.minimum_days_for_obligation);
    let class = classify_compliance(
        &candidate,
        date(2025, 9, 1),
        fiscal_period_end(2025, &policy),
        &policy,
    );
    assert_eq!(class, ComplianceClass::Compliant);
}

#[test]
fn fiscal_year_resolution_is_consistent_at_the_boundary() {
    let policy = FiscalPolicy::default();
    // Period end day 20, start day 21: December 21st already belongs to the
    // next fiscal year, everything else keeps its calendar year.
    assert_eq!(fiscal_year_of(date(2024, 12, 20), &policy), 2024);
    assert_eq!(fiscal_year_of(date(2024, 12, 21), &policy), 2025);
    assert_eq!(fiscal_year_of(date(2025, 4, 1), &policy), 2025);
}
