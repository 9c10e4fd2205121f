//! Notification emission interface.
//!
//! Delivery (email, chat) is an external collaborator; the core only emits
//! typed events. The default implementation writes structured log lines.

use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    LeaveRequestCreated {
        request_id: String,
        employee_num: String,
        days: f64,
    },
    LeaveRequestApproved {
        request_id: String,
        employee_num: String,
        approved_by: String,
    },
    LeaveRequestRejected {
        request_id: String,
        employee_num: String,
        rejected_by: String,
    },
    LeaveRequestReverted {
        request_id: String,
        employee_num: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// Default notifier: emits the event into the tracing stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(target: "notifications", %payload, "notification emitted"),
            Err(err) => tracing::warn!(error = %err, "failed to serialize notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = NotificationEvent::LeaveRequestCreated {
            request_id: "r-1".into(),
            employee_num: "E001".into(),
            days: 3.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "leave_request_created");
        assert_eq!(json["employee_num"], "E001");
    }
}
