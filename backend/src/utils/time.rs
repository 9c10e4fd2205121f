//! Fiscal calendar arithmetic.
//!
//! One anchor is used for every date→year resolution: fiscal year `y` runs
//! from day `period_start_day` of December `y−1` through day `period_end_day`
//! of December `y`. The day-21/20 boundary from the fiscal policy is applied
//! at the December roll-over only, so a date on 2024-12-21 already belongs to
//! fiscal 2025.

use chrono::{Datelike, Months, NaiveDate, Weekday};

use crate::error::AppError;
use crate::models::fiscal::FiscalPolicy;

/// Resolves the fiscal year a calendar date belongs to.
pub fn fiscal_year_of(date: NaiveDate, policy: &FiscalPolicy) -> i32 {
    if date.month() == 12 && date.day() >= policy.period_start_day {
        date.year() + 1
    } else {
        date.year()
    }
}

/// First day of fiscal year `year`.
pub fn fiscal_period_start(year: i32, policy: &FiscalPolicy) -> NaiveDate {
    NaiveDate::from_ymd_opt(year - 1, 12, policy.period_start_day)
        .expect("policy day validated at boot")
}

/// Last day of fiscal year `year`.
pub fn fiscal_period_end(year: i32, policy: &FiscalPolicy) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, policy.period_end_day)
        .expect("policy day validated at boot")
}

/// Whole months between `from` and `to`, zero when `from` is past `to`.
pub fn whole_months_until(from: NaiveDate, to: NaiveDate) -> u32 {
    if from >= to {
        return 0;
    }
    let mut months = 0u32;
    while from
        .checked_add_months(Months::new(months + 1))
        .map(|d| d <= to)
        .unwrap_or(false)
    {
        months += 1;
    }
    months
}

/// Seniority in whole-and-half years between hire date and a reference date.
///
/// Floors to the nearest 0.5 step. A reference date before hire is an error.
pub fn seniority_half_years(hire_date: NaiveDate, as_of: NaiveDate) -> Result<f64, AppError> {
    if as_of < hire_date {
        return Err(AppError::InvalidArgument(format!(
            "Reference date {} precedes hire date {}",
            as_of, hire_date
        )));
    }
    let months = whole_months_until(hire_date, as_of);
    Ok((months / 6) as f64 * 0.5)
}

/// Business days (Monday through Friday) in `start..=end`, ascending.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        match current.weekday() {
            Weekday::Sat | Weekday::Sun => {}
            _ => days.push(current),
        }
        current = match current.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fiscal_year_rolls_over_on_period_start_day() {
        let policy = FiscalPolicy::default();
        assert_eq!(fiscal_year_of(date(2024, 12, 20), &policy), 2024);
        assert_eq!(fiscal_year_of(date(2024, 12, 21), &policy), 2025);
        assert_eq!(fiscal_year_of(date(2025, 1, 5), &policy), 2025);
        assert_eq!(fiscal_year_of(date(2025, 6, 30), &policy), 2025);
    }

    #[test]
    fn fiscal_period_bounds_are_contiguous() {
        let policy = FiscalPolicy::default();
        let end_2024 = fiscal_period_end(2024, &policy);
        let start_2025 = fiscal_period_start(2025, &policy);
        assert_eq!(end_2024.succ_opt().unwrap(), start_2025);
    }

    #[test]
    fn seniority_floors_to_half_years() {
        let hire = date(2018, 7, 1);
        assert_eq!(seniority_half_years(hire, date(2025, 7, 1)).unwrap(), 7.0);
        assert_eq!(seniority_half_years(hire, date(2018, 12, 31)).unwrap(), 0.0);
        assert_eq!(seniority_half_years(hire, date(2019, 1, 1)).unwrap(), 0.5);
        assert_eq!(seniority_half_years(hire, date(2019, 6, 30)).unwrap(), 0.5);
    }

    #[test]
    fn seniority_rejects_reference_before_hire() {
        let hire = date(2024, 4, 1);
        assert!(seniority_half_years(hire, date(2024, 3, 31)).is_err());
    }

    #[test]
    fn business_days_skip_weekends() {
        // 2025-03-10 is a Monday.
        let days = business_days(date(2025, 3, 10), date(2025, 3, 16));
        assert_eq!(days.len(), 5);
        assert_eq!(days[0], date(2025, 3, 10));
        assert_eq!(days[4], date(2025, 3, 14));
    }

    #[test]
    fn whole_months_handles_same_day() {
        assert_eq!(whole_months_until(date(2025, 1, 15), date(2025, 1, 15)), 0);
        assert_eq!(whole_months_until(date(2025, 1, 15), date(2025, 4, 15)), 3);
        // Month-end hire dates clamp, chrono-style: Jan 31 + 1 month = Feb 28.
        assert_eq!(whole_months_until(date(2025, 1, 31), date(2025, 2, 28)), 1);
    }
}
