//! Add-on billing documents and activation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::invoice::InvoiceStatus;
use crate::ids::{CompanyAddOnId, CompanyId, InvoiceAddOnId, ModuleId, ProposalId};

/// A billing document for one approved, module-linked proposal.
///
/// Distinct from a plan subscription invoice; at most one exists per
/// proposal, which the store enforces on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceAddOn {
    pub id: InvoiceAddOnId,
    /// Unique human-facing number, same `INV/YYYYMMDD/XXXXX` scheme as plan
    /// invoices.
    pub number: String,
    pub company_id: CompanyId,
    pub module_id: ModuleId,
    pub proposal_id: ProposalId,
    pub description: String,
    /// Amount in minor units; copied from the approved proposal's estimate.
    pub amount: i64,
    pub status: InvoiceStatus,
    pub snap_token: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl InvoiceAddOn {
    /// Whether the add-on invoice can still be paid at `now`.
    #[must_use]
    pub fn is_payable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Unpaid && self.due_date > now
    }

    /// Record a confirmed payment. Idempotent on already-paid invoices.
    pub fn mark_paid(
        &mut self,
        reference: impl Into<String>,
        method: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        if self.status == InvoiceStatus::Paid {
            return;
        }
        self.status = InvoiceStatus::Paid;
        self.payment_reference = Some(reference.into());
        self.payment_method = Some(method.into());
        self.paid_at = Some(now);
    }
}

/// Activation record granting a company ongoing access to an add-on module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyAddOn {
    pub id: CompanyAddOnId,
    pub company_id: CompanyId,
    pub module_id: ModuleId,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    /// `None` grants perpetual access.
    pub expired_at: Option<DateTime<Utc>>,
}

impl CompanyAddOn {
    /// Activate access starting at `now` for an optional duration in days.
    #[must_use]
    pub fn activate(
        company_id: CompanyId,
        module_id: ModuleId,
        duration_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CompanyAddOnId::new(),
            company_id,
            module_id,
            is_active: true,
            started_at: now,
            expired_at: duration_days.map(|d| now + chrono::Duration::days(i64::from(d))),
        }
    }

    /// Restart the access window on an existing record.
    pub fn reactivate(&mut self, duration_days: Option<u32>, now: DateTime<Utc>) {
        self.is_active = true;
        self.started_at = now;
        self.expired_at = duration_days.map(|d| now + chrono::Duration::days(i64::from(d)));
    }

    /// Whether the company currently has access.
    #[must_use]
    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expired_at.map_or(true, |exp| exp > now)
    }
}
