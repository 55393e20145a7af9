//! Plan subscription invoices.
//!
//! Invoice numbers follow `INV/YYYYMMDD/XXXXX`. The suffix is random;
//! uniqueness is enforced by the store on insert and the issuer retries on
//! collision, so two concurrent issuers can never settle on the same number.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{BillingCycle, Plan};
use crate::ids::{CompanyId, InvoiceId, PlanId};

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Awaiting payment.
    Unpaid,
    /// Payment confirmed by the gateway.
    Paid,
    /// Due date lapsed unpaid; set by an external scheduled job.
    Expired,
    /// Canceled before payment.
    Canceled,
}

impl InvoiceStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            "expired" => Ok(Self::Expired),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("unknown invoice status: {}", s)),
        }
    }
}

/// Point-in-time snapshot of the purchased plan.
///
/// Captured at issue time so historical invoices stay accurate after the
/// plan's price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: PlanId,
    pub plan_name: String,
    /// Amount charged, in minor units.
    pub amount: i64,
    /// Subscription period this invoice purchases.
    pub duration_days: i64,
    pub cycle: BillingCycle,
}

impl PlanSnapshot {
    /// Capture a snapshot of a plan for the given cycle.
    ///
    /// Returns `None` if the plan does not offer the cycle.
    #[must_use]
    pub fn capture(plan: &Plan, cycle: BillingCycle) -> Option<Self> {
        let amount = plan.price_for(cycle)?;
        Some(Self {
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            amount,
            duration_days: cycle.duration_days(),
            cycle,
        })
    }
}

/// A plan subscription invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Unique human-facing number, `INV/YYYYMMDD/XXXXX`. Assigned at
    /// creation, never reassigned.
    pub number: String,
    pub company_id: CompanyId,
    pub plan: PlanSnapshot,
    pub status: InvoiceStatus,
    /// Gateway session token, once a payment has been started.
    pub snap_token: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Whether the invoice can still be paid at `now`.
    ///
    /// True iff the status is unpaid and the due date has not lapsed. Any
    /// other status makes this false regardless of the due date.
    #[must_use]
    pub fn is_payable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Unpaid && self.due_date > now
    }

    /// Whether the invoice is unpaid past its due date.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Unpaid && self.due_date <= now
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

const NUMBER_SUFFIX_LEN: usize = 5;
const NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a candidate invoice number for `date`: `INV/YYYYMMDD/XXXXX`.
///
/// The caller must treat the result as a candidate only; the store enforces
/// uniqueness on insert and the issuer retries on collision.
#[must_use]
pub fn generate_invoice_number(date: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..NUMBER_SUFFIX_LEN)
        .map(|_| NUMBER_ALPHABET[rng.gen_range(0..NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("INV/{}/{}", date.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn snapshot() -> PlanSnapshot {
        PlanSnapshot {
            plan_id: PlanId::new(),
            plan_name: "Team".to_string(),
            amount: 100_000,
            duration_days: 30,
            cycle: BillingCycle::Monthly,
        }
    }

    fn invoice(status: InvoiceStatus, due_date: DateTime<Utc>) -> Invoice {
        Invoice {
            id: InvoiceId::new(),
            number: "INV/20260807/AB12C".to_string(),
            company_id: CompanyId::new(),
            plan: snapshot(),
            status,
            snap_token: None,
            payment_reference: None,
            payment_method: None,
            issued_at: due_date - Duration::hours(24),
            due_date,
            paid_at: None,
        }
    }

    #[test]
    fn test_number_format() {
        let date = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let number = generate_invoice_number(date);
        assert!(number.starts_with("INV/20260807/"));
        let suffix = number.rsplit('/').next().unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_payable_window() {
        let now = Utc::now();
        let inv = invoice(InvoiceStatus::Unpaid, now + Duration::hours(24));
        assert!(inv.is_payable(now));
        assert!(!inv.is_payable(now + Duration::hours(25)));
        assert!(inv.is_overdue(now + Duration::hours(25)));
    }

    #[test]
    fn test_non_unpaid_statuses_are_never_payable() {
        let now = Utc::now();
        let future = now + Duration::hours(24);
        for status in [
            InvoiceStatus::Paid,
            InvoiceStatus::Expired,
            InvoiceStatus::Canceled,
        ] {
            let inv = invoice(status, future);
            assert!(!inv.is_payable(now), "{} should not be payable", status);
            assert!(!inv.is_overdue(now + Duration::hours(48)));
        }
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        let now = Utc::now();
        let mut inv = invoice(InvoiceStatus::Unpaid, now + Duration::hours(24));

        inv.mark_paid("trx-1", "bank_transfer", now);
        assert_eq!(inv.status, InvoiceStatus::Paid);
        let first_paid_at = inv.paid_at;

        inv.mark_paid("trx-2", "credit_card", now + Duration::hours(1));
        assert_eq!(inv.payment_reference.as_deref(), Some("trx-1"));
        assert_eq!(inv.paid_at, first_paid_at);
    }

    #[test]
    fn test_snapshot_capture() {
        let now = Utc::now();
        let plan = Plan::new(
            crate::catalog::NewPlan {
                name: "Team".to_string(),
                price_monthly: 150_000,
                price_yearly: Some(1_500_000),
                is_basic: false,
            },
            now,
        );

        let snap = PlanSnapshot::capture(&plan, BillingCycle::Yearly).unwrap();
        assert_eq!(snap.amount, 1_500_000);
        assert_eq!(snap.duration_days, 365);
        assert_eq!(snap.plan_name, "Team");
    }

    #[test]
    fn test_snapshot_rejects_unoffered_cycle() {
        let now = Utc::now();
        let plan = Plan::new(
            crate::catalog::NewPlan {
                name: "Free".to_string(),
                price_monthly: 0,
                price_yearly: None,
                is_basic: true,
            },
            now,
        );
        assert!(PlanSnapshot::capture(&plan, BillingCycle::Yearly).is_none());
    }
}
