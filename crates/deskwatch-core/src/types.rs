//! Ticket and notification data model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeskWatchError;

/// A ticket snapshot as read from the help desk on one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Conversation ID.
    pub id: i64,
    /// Human-facing ticket number (used in links).
    pub number: i64,
    pub subject: String,
    pub customer_email: String,
    pub customer_name: String,
    pub assigned_user_id: Option<i64>,
    /// Empty when nobody is assigned.
    pub assigned_user_name: String,
    pub last_reply_at: DateTime<Utc>,
    /// Computed by the source at query time.
    pub minutes_since_reply: i64,
    pub mailbox_id: i64,
    /// Fixed by the query that produced this row.
    pub kind: NotificationKind,
}

impl Ticket {
    /// Assigned agent name, or `None` when the ticket is unassigned.
    pub fn assignee(&self) -> Option<&str> {
        let name = self.assigned_user_name.trim();
        if name.is_empty() { None } else { Some(name) }
    }
}

/// Why a ticket needs a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Open ticket, customer replied last, no agent response yet.
    OpenNoAgentResponse,
    /// Pending ticket, agent replied last, customer has not answered.
    PendingNoCustomerResponse,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenNoAgentResponse => "open_no_agent_response",
            Self::PendingNoCustomerResponse => "pending_no_customer_response",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = DeskWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_no_agent_response" => Ok(Self::OpenNoAgentResponse),
            "pending_no_customer_response" => Ok(Self::PendingNoCustomerResponse),
            other => Err(DeskWatchError::database(format!("unknown notification type '{other}'"))),
        }
    }
}

/// Lifecycle state of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Queued,
    Sent,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Sent => "sent",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = DeskWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "sent" => Ok(Self::Sent),
            other => Err(DeskWatchError::database(format!("unknown notification status '{other}'"))),
        }
    }
}

/// Counters for a single evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub tickets_checked: usize,
    pub notifications_sent: usize,
    pub notifications_queued: usize,
    pub errors: usize,
    pub duration: Duration,
}

/// Cumulative statistics over the local notification history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total_notifications: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    pub sent_last_24h: u64,
    pub current_queue_size: u64,
    pub burst_events_7d: u64,
    pub burst_notifications_7d: u64,
    pub response_times_7d: ResponseTimeStats,
}

/// Minutes waited by tickets that were notified in the last 7 days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseTimeStats {
    pub average_minutes: Option<f64>,
    pub minimum_minutes: Option<f64>,
    pub maximum_minutes: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_ticket() -> Ticket {
        Ticket {
            id: 42,
            number: 1042,
            subject: "Printer on fire".into(),
            customer_email: "jo@example.com".into(),
            customer_name: "Jo Doe".into(),
            assigned_user_id: Some(7),
            assigned_user_name: "Sam Agent".into(),
            last_reply_at: Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
            minutes_since_reply: 180,
            mailbox_id: 1,
            kind: NotificationKind::OpenNoAgentResponse,
        }
    }

    #[test]
    fn test_kind_strings() {
        for kind in [NotificationKind::OpenNoAgentResponse, NotificationKind::PendingNoCustomerResponse] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert!("closed".parse::<NotificationKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationKind::PendingNoCustomerResponse).unwrap();
        assert_eq!(json, "\"pending_no_customer_response\"");
    }

    #[test]
    fn test_snapshot_preserves_display_fields() {
        let ticket = sample_ticket();
        let json = serde_json::to_string(&ticket).unwrap();
        let restored: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.subject, ticket.subject);
        assert_eq!(restored.customer_name, ticket.customer_name);
        assert_eq!(restored.assigned_user_name, ticket.assigned_user_name);
        assert_eq!(restored.minutes_since_reply, ticket.minutes_since_reply);
        assert_eq!(restored, ticket);
    }

    #[test]
    fn test_assignee_blank_is_none() {
        let mut ticket = sample_ticket();
        assert_eq!(ticket.assignee(), Some("Sam Agent"));
        ticket.assigned_user_name = " ".into();
        assert_eq!(ticket.assignee(), None);
    }
}
