//! Vacation workbook parsing: one sheet, header row 5, data from row 6.
//!
//! Row layout: employee number, name, category, fiscal year (optional),
//! granted days, then the calendar region interpreted by the sentinel
//! grammar in [`super::cells`].

use std::str::FromStr;

use calamine::{Data, Range};

use crate::models::employee::EmployeeCategory;
use crate::models::fiscal::MAX_GRANT_DAYS;
use crate::models::sync_report::IngestionReport;
use crate::models::usage_event::UsageKind;

use super::cells::{parse_usage_cell, CellOutcome};
use super::{cell_f64, cell_i32, cell_string};

/// Sheet the upstream HR process maintains (full-width space included).
pub const VACATION_SHEET: &str = "作業者データ\u{3000}有給";

/// Data begins on row 6 (1-based); the header occupies row 5.
const DATA_START_ROW: u32 = 5;

const COL_EMPLOYEE_NUM: u32 = 0;
const COL_NAME: u32 = 1;
const COL_CATEGORY: u32 = 2;
const COL_YEAR: u32 = 3;
const COL_GRANTED: u32 = 4;
const COL_CALENDAR_START: u32 = 5;

#[derive(Debug, Clone)]
pub struct VacationRow {
    pub employee_num: String,
    pub name: String,
    pub category: EmployeeCategory,
    pub year: i32,
    pub granted: f64,
    pub events: Vec<ParsedUsage>,
}

#[derive(Debug, Clone)]
pub struct ParsedUsage {
    pub use_date: chrono::NaiveDate,
    pub days_used: f64,
    pub kind: UsageKind,
}

pub struct ParsedVacationSheet {
    pub rows: Vec<VacationRow>,
    pub report: IngestionReport,
}

/// Walks the sheet, skipping malformed rows with structured reasons; only a
/// missing sheet fails the whole file (handled by the caller).
pub fn parse_vacation_sheet(range: &Range<Data>, current_fiscal_year: i32) -> ParsedVacationSheet {
    let mut rows = Vec::new();
    let mut report = IngestionReport::default();
    let last_row = range.end().map(|(r, _)| r).unwrap_or(0);
    let last_col = range.end().map(|(_, c)| c).unwrap_or(0);

    for row in DATA_START_ROW..=last_row {
        let Some(employee_num) = cell_string(range, row, COL_EMPLOYEE_NUM) else {
            continue;
        };
        report.rows_read += 1;

        let Some(name) = cell_string(range, row, COL_NAME) else {
            report.skip(row + 1, "row without an employee name");
            continue;
        };
        let category = match cell_string(range, row, COL_CATEGORY).as_deref().map(parse_category) {
            Some(Some(category)) => category,
            Some(None) => {
                report.skip(row + 1, "unknown employment category");
                continue;
            }
            None => {
                report.skip(row + 1, "row without an employment category");
                continue;
            }
        };

        let year = match cell_i32(range, row, COL_YEAR) {
            Some(year) if (2000..=2100).contains(&year) => year,
            Some(year) => {
                report.skip(row + 1, format!("implausible fiscal year {}", year));
                continue;
            }
            None => {
                // Attribution fallback the operators must be able to audit.
                report.warn(format!(
                    "row {}: no fiscal year column, attributed to {}",
                    row + 1,
                    current_fiscal_year
                ));
                current_fiscal_year
            }
        };

        let granted = cell_f64(range, row, COL_GRANTED).unwrap_or(0.0);
        if !(0.0..=MAX_GRANT_DAYS).contains(&granted) {
            report.skip(row + 1, format!("granted {} outside 0..=20", granted));
            continue;
        }

        let mut events = Vec::new();
        let mut row_ok = true;
        for col in COL_CALENDAR_START..=last_col {
            let Some(raw) = cell_string(range, row, col) else {
                continue;
            };
            match parse_usage_cell(&raw, year) {
                Ok(CellOutcome::Ignore) => {}
                Ok(CellOutcome::Event {
                    date,
                    days_used,
                    kind,
                    assumed_year,
                }) => {
                    if assumed_year {
                        report.warn(format!(
                            "row {}: cell {:?} carried no year, attributed to {}",
                            row + 1,
                            raw,
                            year
                        ));
                    }
                    events.push(ParsedUsage {
                        use_date: date,
                        days_used,
                        kind,
                    });
                }
                Err(reason) => {
                    report.skip(row + 1, reason);
                    row_ok = false;
                    break;
                }
            }
        }
        if !row_ok {
            continue;
        }

        report.rows_accepted += 1;
        rows.push(VacationRow {
            employee_num,
            name,
            category,
            year,
            granted,
            events,
        });
    }

    ParsedVacationSheet { rows, report }
}

fn parse_category(raw: &str) -> Option<EmployeeCategory> {
    if let Ok(category) = EmployeeCategory::from_str(raw) {
        return Some(category);
    }
    if raw.contains("派遣") {
        Some(EmployeeCategory::Dispatch)
    } else if raw.contains("契約") {
        Some(EmployeeCategory::Contract)
    } else if raw.contains("社員") || raw.contains("スタッフ") {
        Some(EmployeeCategory::Staff)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range_from(rows: Vec<Vec<Data>>) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;
        let mut range = Range::new((0, 0), (height.max(1) - 1, width.max(1) - 1));
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                range.set_value((r as u32, c as u32), value);
            }
        }
        range
    }

    fn header_rows() -> Vec<Vec<Data>> {
        vec![vec![Data::Empty; 8]; 5]
    }

    #[test]
    fn rows_produce_typed_events() {
        let mut rows = header_rows();
        rows.push(vec![
            Data::String("E001".into()),
            Data::String("佐藤 花子".into()),
            Data::String("派遣".into()),
            Data::Float(2025.0),
            Data::Float(11.0),
            Data::String("2025/4/14".into()),
            Data::String("2025/6/3(半)".into()),
            Data::String("*".into()),
        ]);
        let parsed = parse_vacation_sheet(&range_from(rows), 2025);

        assert_eq!(parsed.report.rows_read, 1);
        assert_eq!(parsed.report.rows_accepted, 1);
        assert_eq!(parsed.rows.len(), 1);
        let row = &parsed.rows[0];
        assert_eq!(row.employee_num, "E001");
        assert_eq!(row.category, EmployeeCategory::Dispatch);
        assert_eq!(row.granted, 11.0);
        assert_eq!(row.events.len(), 2);
        assert_eq!(row.events[0].use_date, NaiveDate::from_ymd_opt(2025, 4, 14).unwrap());
        assert_eq!(row.events[0].days_used, 1.0);
        assert_eq!(row.events[1].days_used, 0.5);
    }

    #[test]
    fn missing_year_column_falls_back_with_a_warning() {
        let mut rows = header_rows();
        rows.push(vec![
            Data::String("E002".into()),
            Data::String("鈴木 一郎".into()),
            Data::String("契約".into()),
            Data::Empty,
            Data::Float(10.0),
            Data::String("4/1".into()),
        ]);
        let parsed = parse_vacation_sheet(&range_from(rows), 2025);

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].year, 2025);
        assert!(parsed
            .report
            .warnings
            .iter()
            .any(|w| w.contains("no fiscal year column")));
    }

    #[test]
    fn oversized_grants_skip_the_row() {
        let mut rows = header_rows();
        rows.push(vec![
            Data::String("E003".into()),
            Data::String("田中".into()),
            Data::String("社員".into()),
            Data::Float(2025.0),
            Data::Float(25.0),
        ]);
        let parsed = parse_vacation_sheet(&range_from(rows), 2025);
        assert_eq!(parsed.rows.len(), 0);
        assert_eq!(parsed.report.rows_skipped, 1);
    }

    #[test]
    fn bad_cells_skip_the_row_with_a_reason() {
        let mut rows = header_rows();
        rows.push(vec![
            Data::String("E004".into()),
            Data::String("高橋".into()),
            Data::String("派遣".into()),
            Data::Float(2025.0),
            Data::Float(12.0),
            Data::String("??".into()),
        ]);
        let parsed = parse_vacation_sheet(&range_from(rows), 2025);
        assert_eq!(parsed.rows.len(), 0);
        assert_eq!(parsed.report.rows_skipped, 1);
        assert!(!parsed.report.warnings.is_empty());
    }
}
