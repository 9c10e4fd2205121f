pub mod audit_log;
pub mod employee;
pub mod ledger;
pub mod leave_request;
pub mod repository;
pub mod sync_report;
pub mod usage_event;
pub mod user;

pub use audit_log::AuditLogRepository;
pub use employee::EmployeeRepository;
pub use ledger::LedgerRepository;
pub use leave_request::LeaveRequestRepository;
pub use sync_report::SyncReportRepository;
pub use usage_event::UsageEventRepository;
pub use user::UserRepository;
