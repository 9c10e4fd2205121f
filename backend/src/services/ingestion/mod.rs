//! Excel ingestion pipeline.
//!
//! Two workbook families: the vacation workbook (one sheet, sentinel-typed
//! calendar cells) and the register workbook (one sheet per employment
//! category). A malformed row is skipped with a structured reason; a
//! malformed file fails the run with no partial writes. Re-ingesting the
//! same workbook converges: registers upsert on `employee_num`, usage events
//! upsert on (`employee_num`, `year`, `use_date`).

pub mod cells;
pub mod registers;
pub mod vacation;

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::audit_log::{AuditAction, NewAuditEntry};
use crate::models::employee::EmployeeStatus;
use crate::models::fiscal::FiscalPolicy;
use crate::models::ledger::EmployeeYear;
use crate::models::sync_report::{IngestionReport, SyncReport, WorkbookKind};
use crate::models::usage_event::{UsageEvent, UsageSource};
use crate::models::user::User;
use crate::repositories::repository::transaction::{begin_transaction, commit_transaction};
use crate::repositories::{
    AuditLogRepository, EmployeeRepository, LedgerRepository, SyncReportRepository,
    UsageEventRepository,
};
use crate::utils::time::fiscal_year_of;

use registers::{CONTRACT_SHEET, DISPATCH_SHEET, STAFF_SHEET};
use vacation::VACATION_SHEET;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestionService {
    ledger: LedgerRepository,
    events: UsageEventRepository,
    registers: EmployeeRepository,
    audit: AuditLogRepository,
    reports: SyncReportRepository,
}

impl IngestionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests a vacation workbook: ledger rows, usage events, and the run
    /// report, all inside one transaction.
    pub async fn ingest_vacation(
        &self,
        db: &PgPool,
        bytes: &[u8],
        policy: &FiscalPolicy,
        actor: &User,
    ) -> Result<IngestionReport, AppError> {
        let range = open_required_sheet(bytes, VACATION_SHEET)?;
        let current_fiscal_year = fiscal_year_of(Utc::now().date_naive(), policy);
        let parsed = vacation::parse_vacation_sheet(&range, current_fiscal_year);

        let nums: Vec<String> = parsed.rows.iter().map(|r| r.employee_num.clone()).collect();
        let known: HashMap<String, _> = self
            .registers
            .find_records_by_nums(db, &nums)
            .await?
            .into_iter()
            .map(|record| (record.employee_num.clone(), record))
            .collect();

        let mut tx = begin_transaction(db).await?;
        for row in &parsed.rows {
            let register = known.get(&row.employee_num);
            let year_row = EmployeeYear {
                employee_num: row.employee_num.clone(),
                year: row.year,
                name: row.name.clone(),
                category: row.category,
                work_location: register.and_then(|r| r.work_location.clone()),
                granted: row.granted,
                used: 0.0,
                carried_in: 0.0,
                carried_out: 0.0,
                expired: 0.0,
                balance: row.granted,
                hire_date: register.and_then(|r| r.hire_date),
                leave_date: register.and_then(|r| r.leave_date),
                status: register.map(|r| r.status).unwrap_or(EmployeeStatus::Active),
                last_updated: Utc::now(),
            };
            self.ledger.upsert_ingested_year(&mut tx, &year_row).await?;

            for usage in &row.events {
                let event = UsageEvent::new(
                    row.employee_num.clone(),
                    row.year,
                    usage.use_date,
                    usage.days_used,
                    usage.kind,
                    UsageSource::Ingested,
                );
                self.events.upsert(&mut tx, &event).await?;
            }
            self.ledger
                .reconcile_from_events(&mut tx, &row.employee_num, row.year)
                .await?;
        }

        let sync_report = SyncReport::from_report(WorkbookKind::Vacation, &parsed.report, actor.id.clone());
        self.reports.insert(&mut tx, &sync_report).await?;

        let entry = NewAuditEntry::new(
            actor.id.clone(),
            AuditAction::Sync,
            "vacation_workbook",
            sync_report.id.clone(),
        )
        .with_extra(serde_json::json!({
            "rows_read": parsed.report.rows_read,
            "rows_accepted": parsed.report.rows_accepted,
            "rows_skipped": parsed.report.rows_skipped,
        }));
        self.audit.insert(&mut tx, &entry.stamp()).await?;
        commit_transaction(tx).await?;

        Ok(parsed.report)
    }

    /// Ingests a register workbook (all three category sheets required).
    pub async fn ingest_register(
        &self,
        db: &PgPool,
        bytes: &[u8],
        actor: &User,
    ) -> Result<IngestionReport, AppError> {
        let dispatch = open_required_sheet(bytes, DISPATCH_SHEET)?;
        let contract = open_required_sheet(bytes, CONTRACT_SHEET)?;
        let staff = open_required_sheet(bytes, STAFF_SHEET)?;
        let parsed = registers::parse_register_sheets(&dispatch, &contract, &staff);

        let mut tx = begin_transaction(db).await?;
        for record in &parsed.records {
            self.registers.upsert(&mut tx, record).await?;
        }

        let sync_report = SyncReport::from_report(WorkbookKind::Register, &parsed.report, actor.id.clone());
        self.reports.insert(&mut tx, &sync_report).await?;

        let entry = NewAuditEntry::new(
            actor.id.clone(),
            AuditAction::Sync,
            "register_workbook",
            sync_report.id.clone(),
        )
        .with_extra(serde_json::json!({
            "rows_read": parsed.report.rows_read,
            "rows_accepted": parsed.report.rows_accepted,
            "rows_skipped": parsed.report.rows_skipped,
        }));
        self.audit.insert(&mut tx, &entry.stamp()).await?;
        commit_transaction(tx).await?;

        Ok(parsed.report)
    }
}

/// Opens a sheet by exact name, falling back to a contains-match for
/// operator-decorated tab names. Reads xlsx first, then legacy xls, which
/// covers both UTF-8 and Shift-JIS encoded inputs.
fn open_required_sheet(bytes: &[u8], sheet: &str) -> Result<Range<Data>, AppError> {
    if let Ok(mut workbook) = Xlsx::new(Cursor::new(bytes)) {
        return take_sheet(&mut workbook, sheet);
    }
    let mut workbook = Xls::new(Cursor::new(bytes)).map_err(|err| {
        AppError::IngestionFailed(format!("Workbook is not readable xlsx/xls: {}", err))
    })?;
    take_sheet(&mut workbook, sheet)
}

fn take_sheet<RS, R>(workbook: &mut R, sheet: &str) -> Result<Range<Data>, AppError>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let names = workbook.sheet_names().to_owned();
    let resolved = names
        .iter()
        .find(|name| name.as_str() == sheet)
        .or_else(|| names.iter().find(|name| name.contains(sheet)))
        .cloned()
        .ok_or_else(|| {
            AppError::IngestionFailed(format!("Required sheet {:?} is missing", sheet))
        })?;
    workbook.worksheet_range(&resolved).map_err(|err| {
        AppError::IngestionFailed(format!("Cannot read sheet {:?}: {}", resolved, err))
    })
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel's day zero is 1899-12-30 (the 1900 leap-year bug folded in).
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = serial.trunc() as i64;
    if !(0..=200_000).contains(&days) {
        return None;
    }
    base.checked_add_signed(chrono::Duration::days(days))
}

pub(crate) fn cell_string(range: &Range<Data>, row: u32, col: u32) -> Option<String> {
    let value = range.get_value((row, col))?;
    let text = match value {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn cell_f64(range: &Range<Data>, row: u32, col: u32) -> Option<f64> {
    match range.get_value((row, col))? {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn cell_i32(range: &Range<Data>, row: u32, col: u32) -> Option<i32> {
    cell_f64(range, row, col).map(|f| f.round() as i32)
}

/// Date cell: string form or an Excel serial number.
pub(crate) fn cell_date(
    range: &Range<Data>,
    row: u32,
    col: u32,
) -> Result<Option<NaiveDate>, String> {
    let Some(value) = range.get_value((row, col)) else {
        return Ok(None);
    };
    match value {
        Data::Empty => Ok(None),
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            for format in ["%Y/%m/%d", "%Y-%m-%d", "%Y年%m月%d日"] {
                if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                    return Ok(Some(date));
                }
            }
            Err(format!("unparseable date {:?}", trimmed))
        }
        Data::Float(f) => excel_serial_to_date(*f)
            .map(Some)
            .ok_or_else(|| format!("implausible date serial {}", f)),
        Data::Int(i) => excel_serial_to_date(*i as f64)
            .map(Some)
            .ok_or_else(|| format!("implausible date serial {}", i)),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Some)
            .ok_or_else(|| format!("implausible date serial {}", dt.as_f64())),
        other => Err(format!("unsupported date cell {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excel_serials_resolve_against_day_zero() {
        // 2018-07-01 is serial 43282.
        assert_eq!(
            excel_serial_to_date(43282.0),
            NaiveDate::from_ymd_opt(2018, 7, 1)
        );
        assert_eq!(excel_serial_to_date(-5.0), None);
    }
}
