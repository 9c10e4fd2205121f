pub mod employee_cache;
pub mod ingestion;
pub mod ledger;
pub mod notifier;
pub mod workflow;
