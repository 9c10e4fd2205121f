//! Sentinel grammar for the vacation sheet's calendar cells.
//!
//! Cells carry typed markers evaluated in a fixed order, stopping at the
//! first match: padding (`*`), range markers (`n日間`), expiry (`消滅`),
//! half days (`半`/`0.5`/`AM`/`PM`), hourly (`2h`/`2時間`), pay-outs
//! (`支給`), and plain dates. Parenthetical segments are stripped before any
//! date extraction.

use chrono::{Datelike, NaiveDate};

use crate::models::usage_event::UsageKind;

/// Result of interpreting one calendar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellOutcome {
    /// Padding or range markers; nothing to record.
    Ignore,
    Event {
        date: NaiveDate,
        days_used: f64,
        kind: UsageKind,
        /// The cell carried no year, so the fallback fiscal year was assumed.
        assumed_year: bool,
    },
}

/// Interprets one cell. `fallback_year` is the fiscal year events are
/// attributed to when the cell carries only month and day.
pub fn parse_usage_cell(raw: &str, fallback_year: i32) -> Result<CellOutcome, String> {
    let normalized = normalize_width(raw.trim());
    if normalized.is_empty() || normalized == "*" {
        return Ok(CellOutcome::Ignore);
    }
    if is_range_marker(&normalized) {
        return Ok(CellOutcome::Ignore);
    }

    if normalized.contains("消滅") {
        let (date, assumed_year) = extract_date(&normalized, fallback_year)
            .ok_or_else(|| format!("expiry cell without a date: {:?}", raw))?;
        reject_spreadsheet_noise(date)?;
        return Ok(CellOutcome::Event {
            date,
            days_used: 0.0,
            kind: UsageKind::Expired,
            assumed_year,
        });
    }

    if normalized.contains('半')
        || normalized.contains("0.5")
        || normalized.contains("AM")
        || normalized.contains("PM")
    {
        let (date, assumed_year) = extract_date(&normalized, fallback_year)
            .ok_or_else(|| format!("half-day cell without a date: {:?}", raw))?;
        reject_spreadsheet_noise(date)?;
        return Ok(CellOutcome::Event {
            date,
            days_used: 0.5,
            kind: UsageKind::Half,
            assumed_year,
        });
    }

    if normalized.contains("2h") || normalized.contains("2時間") {
        let (date, assumed_year) = extract_date(&normalized, fallback_year)
            .ok_or_else(|| format!("hourly cell without a date: {:?}", raw))?;
        reject_spreadsheet_noise(date)?;
        return Ok(CellOutcome::Event {
            date,
            days_used: 0.25,
            kind: UsageKind::Hourly,
            assumed_year,
        });
    }

    if normalized.contains("支給") {
        let (date, assumed_year) = extract_date(&normalized, fallback_year)
            .ok_or_else(|| format!("pay-out cell without a date: {:?}", raw))?;
        reject_spreadsheet_noise(date)?;
        return Ok(CellOutcome::Event {
            date,
            days_used: 1.0,
            kind: UsageKind::PaidOut,
            assumed_year,
        });
    }

    let (date, assumed_year) = extract_date(&normalized, fallback_year)
        .ok_or_else(|| format!("unrecognized cell: {:?}", raw))?;
    reject_spreadsheet_noise(date)?;
    Ok(CellOutcome::Event {
        date,
        days_used: 1.0,
        kind: UsageKind::Full,
        assumed_year,
    })
}

/// Year 1900 dates are spreadsheet serial noise, never real leave.
fn reject_spreadsheet_noise(date: NaiveDate) -> Result<(), String> {
    if date.year() == 1900 {
        return Err("year 1900 is spreadsheet serial noise".into());
    }
    Ok(())
}

/// `n日間` padding markers describe a range already expanded into cells.
fn is_range_marker(cell: &str) -> bool {
    cell.strip_suffix("日間")
        .map(|prefix| !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Maps full-width digits, separators and the padding asterisk to their
/// ASCII equivalents so one grammar covers both widths.
fn normalize_width(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32('0' as u32 + (c as u32 - '０' as u32)).unwrap_or(c),
            '／' => '/',
            '－' | 'ー' => '-',
            '＊' => '*',
            '　' => ' ',
            _ => c,
        })
        .collect()
}

/// Removes `(...)` and `（...）` segments.
fn strip_parentheticals(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0u32;
    for c in raw.chars() {
        match c {
            '(' | '（' => depth += 1,
            ')' | '）' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Pulls a calendar date out of a cell, tolerating `YYYY/MM/DD`,
/// `YYYY-MM-DD`, `YYYY年M月D日`, and year-less `M/D` / `M月D日` forms.
fn extract_date(raw: &str, fallback_year: i32) -> Option<(NaiveDate, bool)> {
    let stripped = strip_parentheticals(raw);
    let cleaned: String = stripped
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '/' | '-' | '年' | '月' | '日'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| matches!(c, '/' | '-')).to_string();
    if cleaned.is_empty() {
        return None;
    }

    for format in ["%Y/%m/%d", "%Y-%m-%d", "%Y年%m月%d日"] {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some((date, false));
        }
    }
    parse_month_day(&cleaned)
        .and_then(|(month, day)| NaiveDate::from_ymd_opt(fallback_year, month, day))
        .map(|date| (date, true))
}

fn parse_month_day(cleaned: &str) -> Option<(u32, u32)> {
    let body = cleaned.strip_suffix('日').unwrap_or(cleaned);
    let (month, day) = body
        .split_once('/')
        .or_else(|| body.split_once('月'))
        .or_else(|| body.split_once('-'))?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    if (1..=12).contains(&month) && (1..=31).contains(&day) {
        Some((month, day))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: CellOutcome) -> (NaiveDate, f64, UsageKind, bool) {
        match outcome {
            CellOutcome::Event {
                date,
                days_used,
                kind,
                assumed_year,
            } => (date, days_used, kind, assumed_year),
            CellOutcome::Ignore => panic!("expected an event"),
        }
    }

    #[test]
    fn padding_and_range_markers_are_ignored() {
        assert_eq!(parse_usage_cell("*", 2025).unwrap(), CellOutcome::Ignore);
        assert_eq!(parse_usage_cell("＊", 2025).unwrap(), CellOutcome::Ignore);
        assert_eq!(parse_usage_cell("3日間", 2025).unwrap(), CellOutcome::Ignore);
        assert_eq!(parse_usage_cell("１０日間", 2025).unwrap(), CellOutcome::Ignore);
        assert_eq!(parse_usage_cell("", 2025).unwrap(), CellOutcome::Ignore);
        assert_eq!(parse_usage_cell("   ", 2025).unwrap(), CellOutcome::Ignore);
    }

    #[test]
    fn expiry_cells_record_zero_day_events() {
        let (date, days, kind, _) = event(parse_usage_cell("2024/5/20 消滅", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 20).unwrap());
        assert_eq!(days, 0.0);
        assert_eq!(kind, UsageKind::Expired);
    }

    #[test]
    fn half_day_markers_win_over_plain_dates() {
        let (date, days, kind, _) = event(parse_usage_cell("2025/6/3(半)", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 3).unwrap());
        assert_eq!(days, 0.5);
        assert_eq!(kind, UsageKind::Half);

        let (_, days, kind, _) = event(parse_usage_cell("6/3 AM", 2025).unwrap());
        assert_eq!(days, 0.5);
        assert_eq!(kind, UsageKind::Half);

        let (_, days, _, _) = event(parse_usage_cell("2025/6/3（0.5）", 2025).unwrap());
        assert_eq!(days, 0.5);
    }

    #[test]
    fn hourly_markers_are_quarter_days() {
        let (date, days, kind, _) = event(parse_usage_cell("2025/7/1(2h)", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(days, 0.25);
        assert_eq!(kind, UsageKind::Hourly);

        let (_, days, kind, _) = event(parse_usage_cell("7/1 2時間", 2025).unwrap());
        assert_eq!(days, 0.25);
        assert_eq!(kind, UsageKind::Hourly);
    }

    #[test]
    fn payout_cells_strip_the_parenthetical_before_the_date() {
        let (date, days, kind, _) = event(parse_usage_cell("2025/3/31（退職時支給）", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
        assert_eq!(days, 1.0);
        assert_eq!(kind, UsageKind::PaidOut);
    }

    #[test]
    fn plain_dates_are_full_days() {
        let (date, days, kind, assumed) = event(parse_usage_cell("2025/4/14", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 4, 14).unwrap());
        assert_eq!(days, 1.0);
        assert_eq!(kind, UsageKind::Full);
        assert!(!assumed);

        let (date, _, _, assumed) = event(parse_usage_cell("4月14日", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 4, 14).unwrap());
        assert!(assumed);
    }

    #[test]
    fn year_1900_is_rejected_as_serial_noise() {
        assert!(parse_usage_cell("1900/1/5", 2025).is_err());
    }

    #[test]
    fn unrecognized_cells_fail_with_the_raw_value() {
        let err = parse_usage_cell("有給?", 2025).unwrap_err();
        assert!(err.contains("有給?"));
    }

    #[test]
    fn full_width_forms_are_normalized() {
        let (date, days, _, _) = event(parse_usage_cell("２０２５／４／１４", 2025).unwrap());
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 4, 14).unwrap());
        assert_eq!(days, 1.0);
    }
}
