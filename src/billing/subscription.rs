//! Plan subscriptions and the company billing aggregate.
//!
//! `CompanyBillingState` owns the invariant that a company has at most one
//! active subscription. Every activation goes through the aggregate, which
//! decides between extending the current period and starting a fresh
//! subscription that replaces the prior one. The store commits the decision
//! in a single operation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::invoice::Invoice;
use crate::ids::{CompanyId, InvoiceId, PlanId, SubscriptionId};

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Current paid subscription.
    Active,
    /// Period ended without renewal; set by an external scheduled job.
    Expired,
    /// Canceled by the company.
    Canceled,
    /// Superseded by a newer subscription for the same company.
    Replaced,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
            Self::Replaced => "replaced",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plan subscription purchased by an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// The invoice that most recently paid for this subscription.
    pub invoice_id: InvoiceId,
    pub company_id: CompanyId,
    pub plan_id: PlanId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub billing_cycle: crate::catalog::BillingCycle,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether the subscription currently grants access.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.ends_at > now
    }

    /// Whether the subscription ends within the reminder window.
    #[must_use]
    pub fn is_expiring_soon(&self, now: DateTime<Utc>, days: u32) -> bool {
        self.is_active(now) && self.ends_at <= now + Duration::days(i64::from(days))
    }
}

/// The outcome of applying a paid plan invoice to a company's billing state.
#[derive(Debug, Clone)]
#[must_use]
pub enum Activation {
    /// The current subscription's period was extended in place.
    Extended(Subscription),
    /// A new subscription starts; the prior active one (if any) is replaced.
    Started {
        subscription: Subscription,
        replaced: Option<SubscriptionId>,
    },
}

impl Activation {
    /// The subscription that is active after the activation commits.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        match self {
            Self::Extended(sub) => sub,
            Self::Started { subscription, .. } => subscription,
        }
    }
}

/// Aggregate root for a company's subscription state.
///
/// Load it with the company's current active subscription, apply a paid
/// invoice, and commit the resulting [`Activation`] through the store.
#[derive(Debug, Clone)]
pub struct CompanyBillingState {
    company_id: CompanyId,
    active: Option<Subscription>,
}

impl CompanyBillingState {
    #[must_use]
    pub fn new(company_id: CompanyId, active: Option<Subscription>) -> Self {
        Self { company_id, active }
    }

    #[must_use]
    pub fn company_id(&self) -> &CompanyId {
        &self.company_id
    }

    #[must_use]
    pub fn active_subscription(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }

    /// Apply a paid plan invoice.
    ///
    /// Renewing the same plan before expiry extends the current period from
    /// its end (no proration). Anything else starts a new subscription now
    /// and replaces the prior active one, keeping at most one active row.
    pub fn activate(&self, invoice: &Invoice, now: DateTime<Utc>) -> Activation {
        let duration = Duration::days(invoice.plan.duration_days);

        if let Some(current) = &self.active {
            if current.is_active(now) && current.plan_id == invoice.plan.plan_id {
                let mut extended = current.clone();
                extended.ends_at += duration;
                extended.invoice_id = invoice.id.clone();
                extended.billing_cycle = invoice.plan.cycle;
                extended.updated_at = now;
                return Activation::Extended(extended);
            }
        }

        let subscription = Subscription {
            id: SubscriptionId::new(),
            invoice_id: invoice.id.clone(),
            company_id: self.company_id.clone(),
            plan_id: invoice.plan.plan_id.clone(),
            starts_at: now,
            ends_at: now + duration,
            billing_cycle: invoice.plan.cycle,
            status: SubscriptionStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let replaced = self
            .active
            .as_ref()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .map(|s| s.id.clone());

        Activation::Started {
            subscription,
            replaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::invoice::{InvoiceStatus, PlanSnapshot};
    use crate::catalog::BillingCycle;

    fn paid_invoice(company_id: &CompanyId, plan_id: &PlanId, days: i64) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId::new(),
            number: "INV/20260807/AAAAA".to_string(),
            company_id: company_id.clone(),
            plan: PlanSnapshot {
                plan_id: plan_id.clone(),
                plan_name: "Team".to_string(),
                amount: 150_000,
                duration_days: days,
                cycle: BillingCycle::Monthly,
            },
            status: InvoiceStatus::Paid,
            snap_token: None,
            payment_reference: Some("trx".to_string()),
            payment_method: Some("bank_transfer".to_string()),
            issued_at: now,
            due_date: now + Duration::days(1),
            paid_at: Some(now),
        }
    }

    #[test]
    fn test_first_activation_starts_fresh() {
        let company = CompanyId::new();
        let plan = PlanId::new();
        let now = Utc::now();

        let state = CompanyBillingState::new(company.clone(), None);
        let activation = state.activate(&paid_invoice(&company, &plan, 30), now);

        match activation {
            Activation::Started {
                subscription,
                replaced,
            } => {
                assert!(replaced.is_none());
                assert_eq!(subscription.starts_at, now);
                assert_eq!(subscription.ends_at, now + Duration::days(30));
                assert!(subscription.is_active(now));
            }
            Activation::Extended(_) => panic!("expected a fresh start"),
        }
    }

    #[test]
    fn test_same_plan_renewal_extends_from_current_end() {
        let company = CompanyId::new();
        let plan = PlanId::new();
        let now = Utc::now();

        let state = CompanyBillingState::new(company.clone(), None);
        let first = state.activate(&paid_invoice(&company, &plan, 30), now);
        let current = first.subscription().clone();

        // Renew 10 days in, same plan.
        let renew_at = now + Duration::days(10);
        let state = CompanyBillingState::new(company.clone(), Some(current.clone()));
        let renewal = state.activate(&paid_invoice(&company, &plan, 30), renew_at);

        match renewal {
            Activation::Extended(sub) => {
                assert_eq!(sub.id, current.id);
                assert_eq!(sub.ends_at, current.ends_at + Duration::days(30));
            }
            Activation::Started { .. } => panic!("expected an extension"),
        }
    }

    #[test]
    fn test_plan_change_replaces_prior_active() {
        let company = CompanyId::new();
        let now = Utc::now();

        let state = CompanyBillingState::new(company.clone(), None);
        let first = state
            .activate(&paid_invoice(&company, &PlanId::new(), 30), now)
            .subscription()
            .clone();

        let upgrade_at = now + Duration::days(5);
        let state = CompanyBillingState::new(company.clone(), Some(first.clone()));
        let upgrade = state.activate(&paid_invoice(&company, &PlanId::new(), 365), upgrade_at);

        match upgrade {
            Activation::Started {
                subscription,
                replaced,
            } => {
                assert_eq!(replaced, Some(first.id));
                assert_eq!(subscription.ends_at, upgrade_at + Duration::days(365));
            }
            Activation::Extended(_) => panic!("expected a replacement"),
        }
    }

    #[test]
    fn test_renewal_after_expiry_starts_fresh() {
        let company = CompanyId::new();
        let plan = PlanId::new();
        let now = Utc::now();

        let state = CompanyBillingState::new(company.clone(), None);
        let first = state
            .activate(&paid_invoice(&company, &plan, 30), now)
            .subscription()
            .clone();

        // Renew 40 days later: the old period lapsed.
        let renew_at = now + Duration::days(40);
        let state = CompanyBillingState::new(company.clone(), Some(first.clone()));
        let renewal = state.activate(&paid_invoice(&company, &plan, 30), renew_at);

        match renewal {
            Activation::Started { subscription, .. } => {
                assert_eq!(subscription.starts_at, renew_at);
            }
            Activation::Extended(_) => panic!("expected a fresh start after expiry"),
        }
    }

    #[test]
    fn test_expiring_soon_window() {
        let company = CompanyId::new();
        let plan = PlanId::new();
        let now = Utc::now();

        let state = CompanyBillingState::new(company.clone(), None);
        let sub = state
            .activate(&paid_invoice(&company, &plan, 30), now)
            .subscription()
            .clone();

        assert!(!sub.is_expiring_soon(now, 3));
        assert!(sub.is_expiring_soon(now + Duration::days(28), 3));
        // Lapsed subscriptions are no longer "expiring soon".
        assert!(!sub.is_expiring_soon(now + Duration::days(31), 3));
    }
}
