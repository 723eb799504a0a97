//! Records owned by the collaborator stores.

use crate::proto::{AlarmType, Status};

/// An organization.
#[derive(Debug, Clone, PartialEq)]
pub struct Org {
    pub id: String,
    pub name: String,
    /// Sender name used for outbound email.
    pub display_name: String,
    pub email: String,
}

/// Notification fan-out configured for a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub id: String,
    pub org_id: String,
    pub rule_id: String,
    pub name: String,
    pub status: Status,
    pub alarm_type: AlarmType,
    /// Users carrying any of these tags are notified.
    pub user_tags: Vec<String>,
    pub subject_template: String,
    pub body_template: String,
    /// Minimum seconds between two notifications of the same user for the
    /// same device and alarm.
    pub repeat_interval_secs: u32,
}

/// A notification recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Push notification user key.
    pub app_key: String,
    pub status: Status,
    pub tags: Vec<String>,
}

/// Record that a rule fired for a point.
///
/// `(org_id, uniq_id, rule_id, created_at)` is unique; a duplicate create
/// means the event was already recorded by an earlier delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub org_id: String,
    pub uniq_id: String,
    pub rule_id: String,
    pub created_at: jiff::Timestamp,
    pub trace_id: String,
}

/// Outcome of a notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Sent,
    Error,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Sent => "SENT",
            AlertStatus::Error => "ERROR",
        }
    }
}

/// Audit record of one notification attempt for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub org_id: String,
    pub uniq_id: String,
    pub alarm_id: String,
    pub user_id: String,
    pub status: AlertStatus,
    /// Failure message, set when `status` is `Error`.
    pub error: Option<String>,
    pub trace_id: String,
    pub created_at: jiff::Timestamp,
}
