//! Register workbook parsing: one sheet per employment category, positional
//! columns, category-specific header rows.

use calamine::{Data, Range};
use chrono::NaiveDate;

use crate::models::employee::{EmployeeCategory, RegisterUpsert};
use crate::models::sync_report::IngestionReport;

use super::{cell_date, cell_i32, cell_string};

/// Sheet names as delivered by the upstream HR process. Lookup falls back to
/// a contains-match because operators occasionally decorate the tab names.
pub const DISPATCH_SHEET: &str = "派遣社員";
pub const CONTRACT_SHEET: &str = "契約社員";
pub const STAFF_SHEET: &str = "正社員";

/// Header rows are 1-based as documented by the workbook contract:
/// dispatch 3, contract 4, staff 2. Data starts on the following row.
const DISPATCH_DATA_START: u32 = 3;
const CONTRACT_DATA_START: u32 = 4;
const STAFF_DATA_START: u32 = 2;

pub struct ParsedRegisters {
    pub records: Vec<RegisterUpsert>,
    pub report: IngestionReport,
}

pub fn parse_register_sheets(
    dispatch: &Range<Data>,
    contract: &Range<Data>,
    staff: &Range<Data>,
) -> ParsedRegisters {
    let mut records = Vec::new();
    let mut report = IngestionReport::default();
    parse_dispatch(dispatch, &mut records, &mut report);
    parse_contract(contract, &mut records, &mut report);
    parse_staff(staff, &mut records, &mut report);
    records.sort_by(|a, b| a.employee_num.cmp(&b.employee_num));
    ParsedRegisters { records, report }
}

/// Dispatch columns: 1 employee_num, 3 dispatch_name, 7 name, 13 hourly_wage
/// (1-based).
fn parse_dispatch(range: &Range<Data>, records: &mut Vec<RegisterUpsert>, report: &mut IngestionReport) {
    for row in DISPATCH_DATA_START..=range.end().map(|(r, _)| r).unwrap_or(0) {
        let Some(employee_num) = cell_string(range, row, 0) else {
            continue;
        };
        report.rows_read += 1;
        let Some(name) = cell_string(range, row, 6) else {
            report.skip(row + 1, "dispatch row without a name");
            continue;
        };
        let mut record = RegisterUpsert::new(EmployeeCategory::Dispatch, employee_num, name);
        record.dispatch_name = cell_string(range, row, 2);
        record.hourly_wage = cell_i32(range, row, 12);
        record.work_location = record.dispatch_name.clone();
        report.rows_accepted += 1;
        records.push(record);
    }
}

/// Contract columns: 1 employee_num, 2 business, 3 name (1-based).
fn parse_contract(range: &Range<Data>, records: &mut Vec<RegisterUpsert>, report: &mut IngestionReport) {
    for row in CONTRACT_DATA_START..=range.end().map(|(r, _)| r).unwrap_or(0) {
        let Some(employee_num) = cell_string(range, row, 0) else {
            continue;
        };
        report.rows_read += 1;
        let Some(name) = cell_string(range, row, 2) else {
            report.skip(row + 1, "contract row without a name");
            continue;
        };
        let mut record = RegisterUpsert::new(EmployeeCategory::Contract, employee_num, name);
        record.business = cell_string(range, row, 1);
        record.work_location = record.business.clone();
        report.rows_accepted += 1;
        records.push(record);
    }
}

/// Staff columns: 1 employee_num, 3 name, 15 hire_date, 16 leave_date
/// (1-based).
fn parse_staff(range: &Range<Data>, records: &mut Vec<RegisterUpsert>, report: &mut IngestionReport) {
    for row in STAFF_DATA_START..=range.end().map(|(r, _)| r).unwrap_or(0) {
        let Some(employee_num) = cell_string(range, row, 0) else {
            continue;
        };
        report.rows_read += 1;
        let Some(name) = cell_string(range, row, 2) else {
            report.skip(row + 1, "staff row without a name");
            continue;
        };
        let mut record = RegisterUpsert::new(EmployeeCategory::Staff, employee_num, name);
        record.hire_date = parse_date_cell(range, row, 14, report);
        record.leave_date = parse_date_cell(range, row, 15, report);
        report.rows_accepted += 1;
        records.push(record);
    }
}

fn parse_date_cell(
    range: &Range<Data>,
    row: u32,
    col: u32,
    report: &mut IngestionReport,
) -> Option<NaiveDate> {
    match cell_date(range, row, col) {
        Ok(date) => date,
        Err(reason) => {
            report.warn(format!("row {}: {}", row + 1, reason));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn empty_row(width: usize) -> Vec<Data> {
        vec![Data::Empty; width]
    }

    #[test]
    fn dispatch_rows_use_positional_columns() {
        let mut row = empty_row(13);
        row[0] = Data::String("D-001".into());
        row[2] = Data::String("トヨタ第1".into());
        row[6] = Data::String("山田 太郎".into());
        row[12] = Data::Float(1450.0);
        let rows = vec![empty_row(13), empty_row(13), empty_row(13), row];

        let dispatch = range_from(rows);
        let contract = range_from(vec![empty_row(3)]);
        let staff = range_from(vec![empty_row(3)]);
        let parsed = parse_register_sheets(&dispatch, &contract, &staff);

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.category, EmployeeCategory::Dispatch);
        assert_eq!(record.employee_num, "D-001");
        assert_eq!(record.name, "山田 太郎");
        assert_eq!(record.dispatch_name.as_deref(), Some("トヨタ第1"));
        assert_eq!(record.hourly_wage, Some(1450));
        assert_eq!(parsed.report.rows_accepted, 1);
    }

    #[test]
    fn rows_missing_names_are_skipped_not_fatal() {
        let mut incomplete = empty_row(13);
        incomplete[0] = Data::String("D-002".into());
        let rows = vec![empty_row(13), empty_row(13), empty_row(13), incomplete];

        let dispatch = range_from(rows);
        let contract = range_from(vec![empty_row(3)]);
        let staff = range_from(vec![empty_row(3)]);
        let parsed = parse_register_sheets(&dispatch, &contract, &staff);

        assert_eq!(parsed.records.len(), 0);
        assert_eq!(parsed.report.rows_skipped, 1);
        assert_eq!(parsed.report.warnings.len(), 1);
    }

    #[test]
    fn staff_rows_parse_hire_and_leave_dates() {
        let mut row = empty_row(16);
        row[0] = Data::String("S-010".into());
        row[2] = Data::String("佐藤 花子".into());
        row[14] = Data::String("2018/07/01".into());
        row[15] = Data::Empty;
        let rows = vec![empty_row(16), empty_row(16), row];

        let dispatch = range_from(vec![empty_row(3)]);
        let contract = range_from(vec![empty_row(3)]);
        let staff = range_from(rows);
        let parsed = parse_register_sheets(&dispatch, &contract, &staff);

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_eq!(record.category, EmployeeCategory::Staff);
        assert_eq!(
            record.hire_date,
            NaiveDate::from_ymd_opt(2018, 7, 1)
        );
        assert_eq!(record.leave_date, None);
    }
}
