//! The fiscal-year ledger engine: grant computation, LIFO deduction,
//! year-end carry-over, and the five-day compliance scan.
//!
//! Thread safety comes from database transactions, not in-process locks.
//! Every multi-row mutation runs inside one transaction; the deduction path
//! re-reads each touched row before commit and fails `Conflict` when the
//! ledger identity no longer holds.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use crate::error::AppError;
use crate::models::audit_log::{AuditAction, NewAuditEntry, SYSTEM_ACTOR};
use crate::models::fiscal::{grant_days_for_seniority, FiscalPolicy};
use crate::models::ledger::{BalanceBreakdown, DeductionLine, EmployeeYear, LifoEntry};
use crate::models::usage_event::{UsageEvent, UsageKind, UsageSource};
use crate::repositories::ledger::ComplianceCandidate;
use crate::repositories::repository::transaction::{begin_transaction, commit_transaction};
use crate::repositories::{AuditLogRepository, EmployeeRepository, LedgerRepository, UsageEventRepository};
use crate::utils::time::{fiscal_period_end, fiscal_period_start, seniority_half_years, whole_months_until};

const DAY_EPSILON: f64 = 1e-9;

/// Months remaining in the fiscal period under which low usage stops being a
/// warning and becomes a violation.
const FINAL_STRETCH_MONTHS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceClass {
    Compliant,
    AtRisk,
    NonCompliant,
    Exempted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceEntry {
    pub employee_num: String,
    pub name: String,
    pub granted: f64,
    pub carried_in: f64,
    pub used: f64,
    /// Days still to take to satisfy the statutory minimum.
    pub shortfall: f64,
}

#[derive(Debug, Serialize)]
pub struct FiveDayReport {
    pub year: i32,
    pub as_of: NaiveDate,
    pub compliant: Vec<ComplianceEntry>,
    pub at_risk: Vec<ComplianceEntry>,
    pub non_compliant: Vec<ComplianceEntry>,
    pub exempted: Vec<ComplianceEntry>,
}

#[derive(Debug, Serialize)]
pub struct CarryOverSummary {
    pub from_year: i32,
    pub to_year: i32,
    pub carried_employees: u32,
    pub lapsed_days: f64,
    pub expired_rows: u32,
    pub purged_rows: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerEngine {
    policy: FiscalPolicy,
    ledger: LedgerRepository,
    events: UsageEventRepository,
    audit: AuditLogRepository,
    registers: EmployeeRepository,
}

impl LedgerEngine {
    pub fn new(policy: FiscalPolicy) -> Self {
        LedgerEngine {
            policy,
            ledger: LedgerRepository::new(),
            events: UsageEventRepository::new(),
            audit: AuditLogRepository::new(),
            registers: EmployeeRepository::new(),
        }
    }

    pub fn policy(&self) -> &FiscalPolicy {
        &self.policy
    }

    /// Statutory grant for an employee at a reference date, from the hire
    /// date in the register.
    pub async fn grant(
        &self,
        db: &PgPool,
        employee_num: &str,
        as_of: NaiveDate,
    ) -> Result<f64, AppError> {
        let record = self
            .registers
            .find_record(db, employee_num)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Employee {} not found", employee_num)))?;
        let hire_date = record.hire_date.ok_or_else(|| {
            AppError::InvalidArgument(format!("Employee {} has no hire date", employee_num))
        })?;
        let seniority = seniority_half_years(hire_date, as_of)?;
        grant_days_for_seniority(seniority)
    }

    /// Current-year row plus carry-window predecessors with the newest-first
    /// consumption order.
    pub async fn balance_breakdown(
        &self,
        db: &PgPool,
        employee_num: &str,
        year: i32,
    ) -> Result<BalanceBreakdown, AppError> {
        let current = self.ledger.find_year(db, employee_num, year).await?;
        let prior = self
            .ledger
            .find_prior_with_balance(db, employee_num, year, self.policy.max_carry_over_years)
            .await?;
        let lifo_order = lifo_order(&current, &prior);
        let total_available = current.balance.max(0.0);
        Ok(BalanceBreakdown {
            employee_num: employee_num.to_string(),
            year,
            current,
            prior,
            lifo_order,
            total_available,
        })
    }

    /// LIFO deduction inside an existing transaction. Draws `days` newest
    /// first, returns the per-year breakdown, and re-checks the ledger
    /// identity of every touched row before returning.
    pub async fn deduct_in_tx(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        days: f64,
        current_year: i32,
    ) -> Result<Vec<DeductionLine>, AppError> {
        if days <= 0.0 {
            return Err(AppError::InvalidArgument(
                "Deduction must be a positive number of days".into(),
            ));
        }
        let rows = self
            .ledger
            .lock_deduction_rows(
                conn,
                employee_num,
                current_year,
                self.policy.max_carry_over_years,
            )
            .await?;
        let current = rows
            .iter()
            .find(|r| r.year == current_year)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No ledger row for {} in {}",
                    employee_num, current_year
                ))
            })?;
        let prior: Vec<EmployeeYear> = rows
            .into_iter()
            .filter(|r| r.year < current_year && r.balance > 0.0)
            .collect();

        let plan = plan_deduction(&current, &prior, days)?;
        for line in &plan {
            self.ledger
                .apply_draw(conn, employee_num, line.year, line.days)
                .await?;
        }

        // Identity check against concurrent modification; a mismatch rolls
        // the transaction back as Conflict.
        for line in &plan {
            let row = self
                .ledger
                .reload_for_check(conn, employee_num, line.year)
                .await?;
            if (row.recomputed_balance() - row.balance).abs() > DAY_EPSILON {
                return Err(AppError::Conflict(format!(
                    "Ledger identity violated for {}/{}",
                    employee_num, line.year
                )));
            }
        }
        Ok(plan)
    }

    /// Credits a previously recorded deduction back, year by year.
    pub async fn credit_in_tx(
        &self,
        conn: &mut PgConnection,
        employee_num: &str,
        lines: &[DeductionLine],
    ) -> Result<(), AppError> {
        for line in lines {
            self.ledger
                .apply_credit(conn, employee_num, line.year, line.days)
                .await?;
        }
        Ok(())
    }

    /// Year-end carry-over: transfer capped balances into `to_year`, lapse
    /// the excess, expire rows past the carry window, purge rows past the
    /// retention horizon. One transaction; any row failure rolls back all.
    pub async fn carry_over(
        &self,
        db: &PgPool,
        from_year: i32,
        to_year: i32,
    ) -> Result<CarryOverSummary, AppError> {
        if to_year != from_year + 1 {
            return Err(AppError::InvalidArgument(format!(
                "Carry-over must target the next fiscal year ({} -> {})",
                from_year, to_year
            )));
        }
        let mut tx = begin_transaction(db).await?;
        let mut summary = CarryOverSummary {
            from_year,
            to_year,
            carried_employees: 0,
            lapsed_days: 0.0,
            expired_rows: 0,
            purged_rows: 0,
        };

        let new_year_start = fiscal_period_start(to_year, &self.policy);
        let sources = self.ledger.lock_rows_with_balance(&mut tx, from_year).await?;
        for source in sources.iter().filter(|r| r.is_active()) {
            let hire_date = source.hire_date.ok_or_else(|| AppError::CarryOverFailed {
                employee_num: source.employee_num.clone(),
                year: source.year,
                reason: "missing hire date".into(),
            })?;
            let seniority =
                seniority_half_years(hire_date, new_year_start).map_err(|_| {
                    AppError::CarryOverFailed {
                        employee_num: source.employee_num.clone(),
                        year: source.year,
                        reason: "hire date after new fiscal year start".into(),
                    }
                })?;
            let granted_new = grant_days_for_seniority(seniority)?;
            let transfer = source
                .balance
                .min((self.policy.max_accumulated_days - granted_new).max(0.0));
            let lapse = source.balance - transfer;

            self.ledger
                .close_carry_source(&mut tx, &source.employee_num, source.year, transfer, lapse)
                .await?;
            self.ledger
                .upsert_carry_target(&mut tx, source, to_year, granted_new, transfer)
                .await?;

            let entry = NewAuditEntry::new(
                SYSTEM_ACTOR,
                AuditAction::Update,
                "employee_year",
                format!("{}/{}", source.employee_num, to_year),
            )
            .with_extra(serde_json::json!({
                "operation": "carry_over",
                "from_year": from_year,
                "carried_in": transfer,
                "lapsed": lapse,
                "granted": granted_new,
            }));
            self.audit.insert(&mut tx, &entry.stamp()).await?;

            summary.carried_employees += 1;
            summary.lapsed_days += lapse;
        }

        // Statute of limitations: balances older than the carry window lapse
        // entirely, documented by a zero-day expiry event.
        let horizon = to_year - self.policy.max_carry_over_years;
        let aged = self
            .ledger
            .lock_rows_with_balance_at_or_before(&mut tx, horizon)
            .await?;
        for row in &aged {
            let lapsed = row.balance;
            self.ledger
                .expire_row(&mut tx, &row.employee_num, row.year)
                .await?;
            let mut event = UsageEvent::new(
                row.employee_num.clone(),
                row.year,
                fiscal_period_end(row.year, &self.policy),
                0.0,
                UsageKind::Expired,
                UsageSource::Manual,
            );
            event.request_id = None;
            self.events.upsert(&mut tx, &event).await?;

            let entry = NewAuditEntry::new(
                SYSTEM_ACTOR,
                AuditAction::Update,
                "employee_year",
                format!("{}/{}", row.employee_num, row.year),
            )
            .with_extra(serde_json::json!({
                "operation": "expire",
                "lapsed": lapsed,
            }));
            self.audit.insert(&mut tx, &entry.stamp()).await?;
            summary.expired_rows += 1;
        }

        // Retention purge, one audit entry per destroyed row.
        let purge_cutoff = to_year - self.policy.ledger_retention_years;
        let purged = self.ledger.purge_older_than(&mut tx, purge_cutoff).await?;
        for row in &purged {
            let entry = NewAuditEntry::new(
                SYSTEM_ACTOR,
                AuditAction::Delete,
                "employee_year",
                format!("{}/{}", row.employee_num, row.year),
            )
            .with_snapshots(Some(serde_json::to_value(row).unwrap_or_default()), None)
            .with_extra(serde_json::json!({ "operation": "retention_purge" }));
            self.audit.insert(&mut tx, &entry.stamp()).await?;
            summary.purged_rows += 1;
        }

        commit_transaction(tx).await?;
        Ok(summary)
    }

    /// Classifies every employee in scope of the five-day rule for `year`.
    pub async fn check_five_day(
        &self,
        db: &PgPool,
        year: i32,
        as_of: NaiveDate,
    ) -> Result<FiveDayReport, AppError> {
        let candidates = self
            .ledger
            .compliance_candidates(
                db,
                year,
                self.policy.minimum_days_for_obligation,
                self.policy.max_accumulated_days,
            )
            .await?;
        let period_end = fiscal_period_end(year, &self.policy);

        let mut report = FiveDayReport {
            year,
            as_of,
            compliant: Vec::new(),
            at_risk: Vec::new(),
            non_compliant: Vec::new(),
            exempted: Vec::new(),
        };
        for candidate in candidates {
            let class = classify_compliance(&candidate, as_of, period_end, &self.policy);
            let entry = ComplianceEntry {
                employee_num: candidate.employee_num,
                name: candidate.name,
                granted: candidate.granted,
                carried_in: candidate.carry_in_effective,
                used: candidate.used,
                shortfall: (self.policy.minimum_annual_use - candidate.used).max(0.0),
            };
            match class {
                ComplianceClass::Compliant => report.compliant.push(entry),
                ComplianceClass::AtRisk => report.at_risk.push(entry),
                ComplianceClass::NonCompliant => report.non_compliant.push(entry),
                ComplianceClass::Exempted => report.exempted.push(entry),
            }
        }
        Ok(report)
    }
}

/// Newest-available-first consumption order: the current year's own grant at
/// priority 1, then carry-over years at priority 2, capped so the listed
/// availabilities sum to the row's balance.
pub fn lifo_order(current: &EmployeeYear, prior: &[EmployeeYear]) -> Vec<LifoEntry> {
    let mut entries = Vec::new();
    let own = current.own_grant_remaining().min(current.balance.max(0.0));
    entries.push(LifoEntry {
        year: current.year,
        priority: 1,
        available: own,
    });
    let mut carried_capacity = (current.balance - own).max(0.0);
    for row in prior {
        if carried_capacity <= DAY_EPSILON {
            break;
        }
        let available = row.balance.min(carried_capacity);
        if available > DAY_EPSILON {
            entries.push(LifoEntry {
                year: row.year,
                priority: 2,
                available,
            });
            carried_capacity -= available;
        }
    }
    entries
}

/// Computes the per-year draws for a deduction without touching storage.
///
/// Availability is gated on the current-year balance. The draw order is the
/// current year's own grant, then prior years newest first; any residue the
/// carry-in promises but the prior rows no longer hold falls back onto the
/// current row.
pub fn plan_deduction(
    current: &EmployeeYear,
    prior: &[EmployeeYear],
    days: f64,
) -> Result<Vec<DeductionLine>, AppError> {
    let available = current.balance.max(0.0);
    if days > available + DAY_EPSILON {
        return Err(AppError::InsufficientBalance {
            available,
            requested: days,
        });
    }

    let mut lines: Vec<DeductionLine> = Vec::new();
    let mut remaining = days;

    let own = current.own_grant_remaining().min(remaining);
    if own > DAY_EPSILON {
        lines.push(DeductionLine {
            year: current.year,
            days: own,
        });
        remaining -= own;
    }

    let mut sorted: Vec<&EmployeeYear> = prior.iter().collect();
    sorted.sort_by(|a, b| b.year.cmp(&a.year));
    for row in sorted {
        if remaining <= DAY_EPSILON {
            break;
        }
        let draw = row.balance.min(remaining);
        if draw > DAY_EPSILON {
            lines.push(DeductionLine {
                year: row.year,
                days: draw,
            });
            remaining -= draw;
        }
    }

    if remaining > DAY_EPSILON {
        // Carried days whose source rows were already drained elsewhere.
        match lines.iter_mut().find(|l| l.year == current.year) {
            Some(line) => line.days += remaining,
            None => lines.push(DeductionLine {
                year: current.year,
                days: remaining,
            }),
        }
    }
    Ok(lines)
}

/// Pure classification for one compliance candidate.
pub fn classify_compliance(
    candidate: &ComplianceCandidate,
    as_of: NaiveDate,
    period_end: NaiveDate,
    policy: &FiscalPolicy,
) -> ComplianceClass {
    use crate::models::employee::EmployeeStatus;
    if candidate.status != EmployeeStatus::Active {
        return ComplianceClass::Exempted;
    }
    if candidate.used + DAY_EPSILON >= policy.minimum_annual_use {
        return ComplianceClass::Compliant;
    }
    let months_remaining = whole_months_until(as_of, period_end);
    if months_remaining >= FINAL_STRETCH_MONTHS {
        ComplianceClass::AtRisk
    } else {
        ComplianceClass::NonCompliant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::employee::{EmployeeCategory, EmployeeStatus};
    use chrono::Utc;

    fn year_row(year: i32, granted: f64, used: f64, carried_in: f64) -> EmployeeYear {
        EmployeeYear {
            employee_num: "E001".into(),
            year,
            name: "佐藤 花子".into(),
            category: EmployeeCategory::Dispatch,
            work_location: None,
            granted,
            used,
            carried_in,
            carried_out: 0.0,
            expired: 0.0,
            balance: granted + carried_in - used,
            hire_date: chrono::NaiveDate::from_ymd_opt(2018, 7, 1),
            leave_date: None,
            status: EmployeeStatus::Active,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn deduction_draws_newest_first_across_years() {
        // (E001, 2024, granted=10) and (E001, 2025, granted=11, carried_in=8).
        let current = year_row(2025, 11.0, 0.0, 8.0);
        let prior = vec![year_row(2024, 10.0, 0.0, 0.0)];

        let plan = plan_deduction(&current, &prior, 15.0).expect("plan succeeds");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], DeductionLine { year: 2025, days: 11.0 });
        assert_eq!(plan[1], DeductionLine { year: 2024, days: 4.0 });
    }

    #[test]
    fn deduction_fails_closed_when_available_falls_short() {
        let current = year_row(2025, 11.0, 0.0, 8.0);
        let prior = vec![year_row(2024, 10.0, 0.0, 0.0)];

        let err = plan_deduction(&current, &prior, 25.0).unwrap_err();
        match err {
            AppError::InsufficientBalance {
                available,
                requested,
            } => {
                assert_eq!(available, 19.0);
                assert_eq!(requested, 25.0);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn deduction_of_exact_balance_leaves_zero() {
        let current = year_row(2025, 5.0, 0.0, 0.0);
        let plan = plan_deduction(&current, &[], 5.0).expect("exact deduction");
        assert_eq!(plan, vec![DeductionLine { year: 2025, days: 5.0 }]);

        let err = plan_deduction(&current, &[], 6.0).unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
    }

    #[test]
    fn carried_days_without_source_rows_fall_back_to_current_year() {
        // Carry-in recorded on the current row, but the 2024 source row was
        // already drained.
        let current = year_row(2025, 11.0, 11.0, 8.0);
        let plan = plan_deduction(&current, &[], 5.0).expect("draws the carried remainder");
        assert_eq!(plan, vec![DeductionLine { year: 2025, days: 5.0 }]);
    }

    #[test]
    fn lifo_order_lists_current_grant_then_carry_years() {
        let current = year_row(2025, 11.0, 0.0, 8.0);
        let prior = vec![year_row(2024, 10.0, 0.0, 0.0)];
        let order = lifo_order(&current, &prior);
        assert_eq!(order.len(), 2);
        assert_eq!((order[0].year, order[0].priority), (2025, 1));
        assert_eq!(order[0].available, 11.0);
        assert_eq!((order[1].year, order[1].priority), (2024, 2));
        // Capped at the carry-in, not the source row's full balance.
        assert_eq!(order[1].available, 8.0);
        let total: f64 = order.iter().map(|e| e.available).sum();
        assert_eq!(total, current.balance);
    }

    fn candidate(status: EmployeeStatus, granted: f64, carry: f64, used: f64) -> ComplianceCandidate {
        ComplianceCandidate {
            employee_num: "E010".into(),
            name: "鈴木 一郎".into(),
            category: EmployeeCategory::Contract,
            status,
            granted,
            used,
            carry_in_effective: carry,
        }
    }

    #[test]
    fn five_day_rule_counts_combined_availability() {
        // granted=8, carried_in=2: in scope through the combined threshold,
        // and compliant with used=5.
        let policy = FiscalPolicy::default();
        let c = candidate(EmployeeStatus::Active, 8.0, 2.0, 5.0);
        let class = classify_compliance(
            &c,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            fiscal_period_end(2025, &policy),
            &policy,
        );
        assert_eq!(class, ComplianceClass::Compliant);
    }

    #[test]
    fn partial_use_is_at_risk_until_the_final_stretch() {
        let policy = FiscalPolicy::default();
        let period_end = fiscal_period_end(2025, &policy);
        let c = candidate(EmployeeStatus::Active, 10.0, 0.0, 2.0);

        let early = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(
            classify_compliance(&c, early, period_end, &policy),
            ComplianceClass::AtRisk
        );

        let late = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        assert_eq!(
            classify_compliance(&c, late, period_end, &policy),
            ComplianceClass::NonCompliant
        );
    }

    #[test]
    fn zero_use_in_the_final_stretch_is_non_compliant() {
        let policy = FiscalPolicy::default();
        let period_end = fiscal_period_end(2025, &policy);
        let c = candidate(EmployeeStatus::Active, 12.0, 0.0, 0.0);
        let late = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        assert_eq!(
            classify_compliance(&c, late, period_end, &policy),
            ComplianceClass::NonCompliant
        );
    }

    #[test]
    fn inactive_employees_are_exempted_not_violations() {
        let policy = FiscalPolicy::default();
        let period_end = fiscal_period_end(2025, &policy);
        let c = candidate(EmployeeStatus::Retired, 15.0, 0.0, 0.0);
        let late = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert_eq!(
            classify_compliance(&c, late, period_end, &policy),
            ComplianceClass::Exempted
        );
    }
}
