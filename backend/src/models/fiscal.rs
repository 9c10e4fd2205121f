//! Fiscal policy constants and the Labor Standards Act Article 39 grant table.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Statutory ceiling on days granted for a single fiscal year.
pub const MAX_GRANT_DAYS: f64 = 20.0;

/// Article 39 grant table: seniority (in whole-and-half years) to granted days.
/// Lookups floor to the nearest key at or below the seniority value.
pub const GRANT_TABLE: &[(f64, f64)] = &[
    (0.5, 10.0),
    (1.5, 11.0),
    (2.5, 12.0),
    (3.5, 14.0),
    (4.5, 16.0),
    (5.5, 18.0),
    (6.5, 20.0),
];

/// Process-wide fiscal accounting policy, read once at boot and frozen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FiscalPolicy {
    /// Day of month on which a fiscal period opens (previous month).
    pub period_start_day: u32,
    /// Day of month on which a fiscal period closes.
    pub period_end_day: u32,
    /// How many years an unused balance survives before lapsing.
    pub max_carry_over_years: i32,
    /// Hard cap on granted + carried days accumulated into one year.
    pub max_accumulated_days: f64,
    /// Statutory minimum days an obligated employee must use per year.
    pub minimum_annual_use: f64,
    /// Combined-availability threshold that puts an employee in scope of
    /// the five-day rule.
    pub minimum_days_for_obligation: f64,
    /// Ledger rows older than this many years are eligible for purge.
    pub ledger_retention_years: i32,
}

impl Default for FiscalPolicy {
    fn default() -> Self {
        FiscalPolicy {
            period_start_day: 21,
            period_end_day: 20,
            max_carry_over_years: 2,
            max_accumulated_days: 40.0,
            minimum_annual_use: 5.0,
            minimum_days_for_obligation: 10.0,
            ledger_retention_years: 3,
        }
    }
}

impl FiscalPolicy {
    /// Rejects out-of-range policy values before the process starts serving.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=31).contains(&self.period_start_day) {
            anyhow::bail!("period_start_day must be in 1..=31");
        }
        if !(1..=31).contains(&self.period_end_day) {
            anyhow::bail!("period_end_day must be in 1..=31");
        }
        if self.period_end_day >= self.period_start_day {
            anyhow::bail!("period_end_day must precede period_start_day");
        }
        if self.max_carry_over_years < 1 {
            anyhow::bail!("max_carry_over_years must be at least 1");
        }
        if self.max_accumulated_days <= 0.0 {
            anyhow::bail!("max_accumulated_days must be positive");
        }
        if self.minimum_annual_use < 0.0 || self.minimum_days_for_obligation < 0.0 {
            anyhow::bail!("five-day rule thresholds must be non-negative");
        }
        if self.ledger_retention_years < self.max_carry_over_years {
            anyhow::bail!("ledger_retention_years must cover the carry-over window");
        }
        Ok(())
    }
}

/// Maps seniority (whole-and-half years since hire) to statutory granted days.
///
/// Seniority below half a year grants nothing; negative seniority is a caller
/// bug and fails with `InvalidArgument`.
pub fn grant_days_for_seniority(seniority: f64) -> Result<f64, AppError> {
    if seniority < 0.0 {
        return Err(AppError::InvalidArgument(format!(
            "Seniority must be non-negative, got {}",
            seniority
        )));
    }
    let granted = GRANT_TABLE
        .iter()
        .rev()
        .find(|(threshold, _)| seniority >= *threshold)
        .map(|(_, days)| *days)
        .unwrap_or(0.0);
    debug_assert!(granted <= MAX_GRANT_DAYS);
    Ok(granted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_table_boundaries() {
        assert_eq!(grant_days_for_seniority(0.49).unwrap(), 0.0);
        assert_eq!(grant_days_for_seniority(0.5).unwrap(), 10.0);
        assert_eq!(grant_days_for_seniority(1.5).unwrap(), 11.0);
        assert_eq!(grant_days_for_seniority(6.5).unwrap(), 20.0);
        assert_eq!(grant_days_for_seniority(7.0).unwrap(), 20.0);
        assert_eq!(grant_days_for_seniority(1000.0).unwrap(), 20.0);
    }

    #[test]
    fn grant_rejects_negative_seniority() {
        assert!(grant_days_for_seniority(-0.5).is_err());
    }

    #[test]
    fn grant_is_monotonic_and_capped() {
        let mut previous = 0.0;
        let mut s = 0.0;
        while s <= 12.0 {
            let days = grant_days_for_seniority(s).unwrap();
            assert!(days >= previous, "grant must not decrease at {}", s);
            assert!(days <= MAX_GRANT_DAYS);
            previous = days;
            s += 0.25;
        }
    }

    #[test]
    fn default_policy_is_valid() {
        assert!(FiscalPolicy::default().validate().is_ok());
    }

    #[test]
    fn policy_rejects_inverted_period_days() {
        let policy = FiscalPolicy {
            period_start_day: 10,
            period_end_day: 20,
            ..FiscalPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_rejects_retention_shorter_than_carry_window() {
        let policy = FiscalPolicy {
            ledger_retention_years: 1,
            ..FiscalPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
