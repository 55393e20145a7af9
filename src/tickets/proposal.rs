//! Priced proposals for feature-request tickets.
//!
//! A proposal moves `pending -> approved -> billed`, or `pending ->
//! rejected`. Approval is one-way; there is no un-approve path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TasklyError};
use crate::ids::{InvoiceAddOnId, ModuleId, ProposalId, TicketId, UserId};

/// Proposal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Submitted by an admin, awaiting the company's decision.
    Pending,
    /// Approved by the company; ready for billing issuance.
    Approved,
    /// An add-on invoice exists and is linked. Terminal.
    Billed,
    /// Rejected by the company. Terminal, no invoice is ever generated.
    Rejected,
}

impl ProposalStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Billed => "billed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cost/time estimate for fulfilling a feature-request ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketProposal {
    pub id: ProposalId,
    pub ticket_id: TicketId,
    /// Set when billing issuance links the add-on invoice.
    pub invoice_add_on_id: Option<InvoiceAddOnId>,
    /// The add-on module the work would unlock.
    pub module_id: ModuleId,
    /// Estimated price in minor units.
    pub estimated_price: i64,
    pub estimated_days: u32,
    pub status: ProposalStatus,
    pub submitted_by: UserId,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketProposal {
    #[must_use]
    pub fn new(params: NewProposal, now: DateTime<Utc>) -> Self {
        Self {
            id: ProposalId::new(),
            ticket_id: params.ticket_id,
            invoice_add_on_id: None,
            module_id: params.module_id,
            estimated_price: params.estimated_price,
            estimated_days: params.estimated_days,
            status: ProposalStatus::Pending,
            submitted_by: params.submitted_by,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Approved but not yet linked to an invoice.
    #[must_use]
    pub fn is_unbilled(&self) -> bool {
        self.status == ProposalStatus::Approved && self.invoice_add_on_id.is_none()
    }

    /// Approve a pending proposal. One-way; re-approving is a conflict.
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != ProposalStatus::Pending {
            return Err(TasklyError::conflict(format!(
                "proposal is {} and cannot be approved",
                self.status
            )));
        }
        self.status = ProposalStatus::Approved;
        self.approved_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Reject a pending proposal. Terminal.
    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != ProposalStatus::Pending {
            return Err(TasklyError::conflict(format!(
                "proposal is {} and cannot be rejected",
                self.status
            )));
        }
        self.status = ProposalStatus::Rejected;
        self.updated_at = now;
        Ok(())
    }

    /// Link the issued add-on invoice. Only valid from the approved state;
    /// relinking the same invoice is a no-op so issuance can be retried.
    pub fn mark_billed(&mut self, invoice_id: InvoiceAddOnId, now: DateTime<Utc>) -> Result<()> {
        match (&self.status, &self.invoice_add_on_id) {
            (ProposalStatus::Billed, Some(existing)) if *existing == invoice_id => Ok(()),
            (ProposalStatus::Approved, None) => {
                self.status = ProposalStatus::Billed;
                self.invoice_add_on_id = Some(invoice_id);
                self.updated_at = now;
                Ok(())
            }
            _ => Err(TasklyError::conflict(format!(
                "proposal is {} and cannot be billed",
                self.status
            ))),
        }
    }
}

/// Parameters for submitting a proposal.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub ticket_id: TicketId,
    pub module_id: ModuleId,
    pub estimated_price: i64,
    pub estimated_days: u32,
    pub submitted_by: UserId,
}
