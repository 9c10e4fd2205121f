//! Append-only audit trail models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use uuid::Uuid;

/// Actor recorded for mutations not attributable to a logged-in user.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Revert,
    Sync,
    Restore,
}

impl AuditAction {
    pub fn db_value(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::Revert => "revert",
            AuditAction::Sync => "sync",
            AuditAction::Restore => "restore",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub entity_kind: String,
    pub entity_id: String,
    pub before_value: Option<Json<Value>>,
    pub after_value: Option<Json<Value>>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub extra: Option<Json<Value>>,
}

/// Entry handed to the audit service; the id and timestamp are stamped at
/// insert time.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: String,
    pub action: AuditAction,
    pub entity_kind: String,
    pub entity_id: String,
    pub before_value: Option<Value>,
    pub after_value: Option<Value>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub extra: Option<Value>,
}

impl NewAuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: AuditAction,
        entity_kind: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        NewAuditEntry {
            actor: actor.into(),
            action,
            entity_kind: entity_kind.into(),
            entity_id: entity_id.into(),
            before_value: None,
            after_value: None,
            source_ip: None,
            user_agent: None,
            extra: None,
        }
    }

    pub fn with_snapshots(mut self, before: Option<Value>, after: Option<Value>) -> Self {
        self.before_value = before;
        self.after_value = after;
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn stamp(self) -> AuditLog {
        AuditLog {
            id: Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            actor: self.actor,
            action: self.action,
            entity_kind: self.entity_kind,
            entity_id: self.entity_id,
            before_value: self.before_value.map(Json),
            after_value: self.after_value.map(Json),
            source_ip: self.source_ip,
            user_agent: self.user_agent,
            extra: self.extra.map(Json),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamping_fills_id_and_timestamp() {
        let entry = NewAuditEntry::new(SYSTEM_ACTOR, AuditAction::Sync, "sync_report", "r-1")
            .with_extra(serde_json::json!({ "rows_read": 120 }));
        let row = entry.stamp();
        assert!(!row.id.is_empty());
        assert_eq!(row.actor, "system");
        assert_eq!(row.action, AuditAction::Sync);
        assert!(row.extra.is_some());
    }
}
