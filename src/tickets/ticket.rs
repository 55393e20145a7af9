//! Support tickets with an append-only status history.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ids::{CompanyId, TicketId, UserId};

/// Ticket kind. Only feature requests enter the commercial path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Bug,
    Feature,
}

impl TicketKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
        }
    }
}

impl std::fmt::Display for TicketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ticket lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A support ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    /// Unique human-facing code, `TCK-YYYYMMDD-NNNN`.
    pub code: String,
    pub company_id: CompanyId,
    pub kind: TicketKind,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub subject: String,
    pub created_by: UserId,
    pub assigned_to: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a ticket's append-only status trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatusChange {
    pub ticket_id: TicketId,
    pub from_status: TicketStatus,
    pub to_status: TicketStatus,
    pub changed_by: UserId,
    pub note: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Parameters for opening a ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub company_id: CompanyId,
    pub kind: TicketKind,
    pub priority: TicketPriority,
    pub subject: String,
    pub created_by: UserId,
}

/// Generate a candidate ticket code for `date`: `TCK-YYYYMMDD-NNNN`.
///
/// The caller treats the result as a candidate; the store enforces
/// uniqueness on insert and the workflow retries on collision.
#[must_use]
pub fn generate_ticket_code(date: DateTime<Utc>) -> String {
    let serial: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("TCK-{}-{:04}", date.format("%Y%m%d"), serial)
}
