//! Storage trait for billing data.
//!
//! Implement this trait to persist billing state to your database. The
//! store is where the race-sensitive invariants live: invoice-number
//! uniqueness, one add-on invoice per proposal, one active subscription per
//! company, and webhook-event dedup. A SQL backend enforces them with
//! unique constraints and row locks inside a transaction; the in-memory
//! implementation used in tests holds a single write lock for the same
//! effect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::addons::{CompanyAddOn, InvoiceAddOn};
use super::invoice::Invoice;
use super::subscription::{Activation, Subscription};
use crate::error::Result;
use crate::ids::{CompanyId, InvoiceAddOnId, InvoiceId, ModuleId, ProposalId, SubscriptionId};

/// Trait for storing billing data.
#[async_trait]
pub trait BillingStore: Send + Sync {
    // Plan invoices

    /// Insert a new invoice. Fails with a conflict if the number is taken.
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()>;

    /// Update an existing invoice.
    async fn update_invoice(&self, invoice: &Invoice) -> Result<()>;

    /// Get an invoice by ID.
    async fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>>;

    /// Get an invoice by its human-facing number.
    async fn get_invoice_by_number(&self, number: &str) -> Result<Option<Invoice>>;

    /// Get an invoice by its gateway session token.
    async fn get_invoice_by_token(&self, token: &str) -> Result<Option<Invoice>>;

    /// List all invoices for a company, newest first.
    async fn invoices_for_company(&self, company_id: &CompanyId) -> Result<Vec<Invoice>>;

    /// List unpaid invoices.
    async fn unpaid_invoices(&self) -> Result<Vec<Invoice>>;

    /// List unpaid invoices whose due date lapsed before `now`.
    async fn overdue_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>>;

    // Add-on invoices

    /// Insert a new add-on invoice.
    ///
    /// Fails with a conflict if the number is taken or the proposal already
    /// has an invoice; the latter is what makes double-billing impossible
    /// even under concurrent approval.
    async fn insert_add_on_invoice(&self, invoice: &InvoiceAddOn) -> Result<()>;

    /// Update an existing add-on invoice.
    async fn update_add_on_invoice(&self, invoice: &InvoiceAddOn) -> Result<()>;

    /// Get an add-on invoice by ID.
    async fn get_add_on_invoice(&self, id: &InvoiceAddOnId) -> Result<Option<InvoiceAddOn>>;

    /// Get an add-on invoice by its human-facing number.
    async fn get_add_on_invoice_by_number(&self, number: &str) -> Result<Option<InvoiceAddOn>>;

    /// Get the add-on invoice billed for a proposal, if any.
    async fn get_add_on_invoice_by_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Option<InvoiceAddOn>>;

    // Subscriptions

    /// Get the company's active subscription, if any.
    async fn get_active_subscription(&self, company_id: &CompanyId) -> Result<Option<Subscription>>;

    /// Get a subscription by ID.
    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// Commit an activation decided by `CompanyBillingState`.
    ///
    /// Must be atomic: replacing the prior active row and persisting the
    /// new state happen in one operation so no interleaving leaves two
    /// active subscriptions for the company.
    async fn commit_activation(&self, activation: &Activation) -> Result<()>;

    /// List active subscriptions ending within `days` of `now`.
    async fn subscriptions_expiring_soon(
        &self,
        now: DateTime<Utc>,
        days: u32,
    ) -> Result<Vec<Subscription>>;

    // Company add-ons

    /// Get the add-on activation record for a company/module pair.
    async fn get_company_addon(
        &self,
        company_id: &CompanyId,
        module_id: &ModuleId,
    ) -> Result<Option<CompanyAddOn>>;

    /// Insert or update an add-on activation record.
    async fn save_company_addon(&self, addon: &CompanyAddOn) -> Result<()>;

    /// List all add-on activation records for a company.
    async fn list_company_addons(&self, company_id: &CompanyId) -> Result<Vec<CompanyAddOn>>;

    // Webhook idempotency

    /// Check if a gateway webhook event has already been processed.
    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    /// Mark a gateway webhook event as processed.
    async fn mark_event_processed(&self, event_id: &str) -> Result<()>;
}

/// In-memory billing store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use crate::billing::subscription::SubscriptionStatus;
    use crate::error::TasklyError;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, RwLock};

    /// In-memory billing store.
    ///
    /// Wraps data in Arc for cheap cloning. Each mutating method holds one
    /// write lock for its whole critical section, mirroring the
    /// transaction-per-operation discipline expected of SQL backends.
    #[derive(Default, Clone)]
    pub struct InMemoryBillingStore {
        inner: Arc<InMemoryBillingStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryBillingStoreInner {
        invoices: RwLock<HashMap<InvoiceId, Invoice>>,
        add_on_invoices: RwLock<HashMap<InvoiceAddOnId, InvoiceAddOn>>,
        subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
        company_addons: RwLock<Vec<CompanyAddOn>>,
        processed_events: RwLock<HashSet<String>>,
    }

    impl InMemoryBillingStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All subscriptions for a company, any status (for tests).
        pub fn all_subscriptions_for(&self, company_id: &CompanyId) -> Vec<Subscription> {
            self.inner
                .subscriptions
                .read()
                .unwrap()
                .values()
                .filter(|s| &s.company_id == company_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl BillingStore for InMemoryBillingStore {
        async fn insert_invoice(&self, invoice: &Invoice) -> Result<()> {
            let mut invoices = self.inner.invoices.write().unwrap();
            // Same check the unique index on `number` performs in SQL.
            if invoices.values().any(|i| i.number == invoice.number) {
                return Err(TasklyError::conflict(format!(
                    "invoice number '{}' already exists",
                    invoice.number
                )));
            }
            invoices.insert(invoice.id.clone(), invoice.clone());
            Ok(())
        }

        async fn update_invoice(&self, invoice: &Invoice) -> Result<()> {
            let mut invoices = self.inner.invoices.write().unwrap();
            if !invoices.contains_key(&invoice.id) {
                return Err(TasklyError::not_found(format!("invoice {}", invoice.id)));
            }
            invoices.insert(invoice.id.clone(), invoice.clone());
            Ok(())
        }

        async fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>> {
            Ok(self.inner.invoices.read().unwrap().get(id).cloned())
        }

        async fn get_invoice_by_number(&self, number: &str) -> Result<Option<Invoice>> {
            Ok(self
                .inner
                .invoices
                .read()
                .unwrap()
                .values()
                .find(|i| i.number == number)
                .cloned())
        }

        async fn get_invoice_by_token(&self, token: &str) -> Result<Option<Invoice>> {
            Ok(self
                .inner
                .invoices
                .read()
                .unwrap()
                .values()
                .find(|i| i.snap_token.as_deref() == Some(token))
                .cloned())
        }

        async fn invoices_for_company(&self, company_id: &CompanyId) -> Result<Vec<Invoice>> {
            let mut result: Vec<Invoice> = self
                .inner
                .invoices
                .read()
                .unwrap()
                .values()
                .filter(|i| &i.company_id == company_id)
                .cloned()
                .collect();
            result.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
            Ok(result)
        }

        async fn unpaid_invoices(&self) -> Result<Vec<Invoice>> {
            Ok(self
                .inner
                .invoices
                .read()
                .unwrap()
                .values()
                .filter(|i| i.status == crate::billing::InvoiceStatus::Unpaid)
                .cloned()
                .collect())
        }

        async fn overdue_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>> {
            Ok(self
                .inner
                .invoices
                .read()
                .unwrap()
                .values()
                .filter(|i| i.is_overdue(now))
                .cloned()
                .collect())
        }

        async fn insert_add_on_invoice(&self, invoice: &InvoiceAddOn) -> Result<()> {
            let mut invoices = self.inner.add_on_invoices.write().unwrap();
            if invoices.values().any(|i| i.number == invoice.number) {
                return Err(TasklyError::conflict(format!(
                    "invoice number '{}' already exists",
                    invoice.number
                )));
            }
            if invoices
                .values()
                .any(|i| i.proposal_id == invoice.proposal_id)
            {
                return Err(TasklyError::conflict(format!(
                    "proposal {} already has an invoice",
                    invoice.proposal_id
                )));
            }
            invoices.insert(invoice.id.clone(), invoice.clone());
            Ok(())
        }

        async fn update_add_on_invoice(&self, invoice: &InvoiceAddOn) -> Result<()> {
            let mut invoices = self.inner.add_on_invoices.write().unwrap();
            if !invoices.contains_key(&invoice.id) {
                return Err(TasklyError::not_found(format!(
                    "add-on invoice {}",
                    invoice.id
                )));
            }
            invoices.insert(invoice.id.clone(), invoice.clone());
            Ok(())
        }

        async fn get_add_on_invoice(&self, id: &InvoiceAddOnId) -> Result<Option<InvoiceAddOn>> {
            Ok(self.inner.add_on_invoices.read().unwrap().get(id).cloned())
        }

        async fn get_add_on_invoice_by_number(
            &self,
            number: &str,
        ) -> Result<Option<InvoiceAddOn>> {
            Ok(self
                .inner
                .add_on_invoices
                .read()
                .unwrap()
                .values()
                .find(|i| i.number == number)
                .cloned())
        }

        async fn get_add_on_invoice_by_proposal(
            &self,
            proposal_id: &ProposalId,
        ) -> Result<Option<InvoiceAddOn>> {
            Ok(self
                .inner
                .add_on_invoices
                .read()
                .unwrap()
                .values()
                .find(|i| &i.proposal_id == proposal_id)
                .cloned())
        }

        async fn get_active_subscription(
            &self,
            company_id: &CompanyId,
        ) -> Result<Option<Subscription>> {
            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .values()
                .find(|s| &s.company_id == company_id && s.status == SubscriptionStatus::Active)
                .cloned())
        }

        async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
            Ok(self.inner.subscriptions.read().unwrap().get(id).cloned())
        }

        async fn commit_activation(&self, activation: &Activation) -> Result<()> {
            let mut subscriptions = self.inner.subscriptions.write().unwrap();

            let committed = match activation {
                Activation::Extended(sub) => sub,
                Activation::Started {
                    subscription,
                    replaced,
                } => {
                    if let Some(replaced_id) = replaced {
                        if let Some(prior) = subscriptions.get_mut(replaced_id) {
                            prior.status = SubscriptionStatus::Replaced;
                            prior.updated_at = subscription.updated_at;
                        }
                    }
                    subscription
                }
            };

            // An activation that raced another one must still leave a
            // single active row, so demote anything else that is active.
            for other in subscriptions.values_mut() {
                if other.company_id == committed.company_id
                    && other.id != committed.id
                    && other.status == SubscriptionStatus::Active
                {
                    other.status = SubscriptionStatus::Replaced;
                    other.updated_at = committed.updated_at;
                }
            }

            subscriptions.insert(committed.id.clone(), committed.clone());
            Ok(())
        }

        async fn subscriptions_expiring_soon(
            &self,
            now: DateTime<Utc>,
            days: u32,
        ) -> Result<Vec<Subscription>> {
            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .values()
                .filter(|s| s.is_expiring_soon(now, days))
                .cloned()
                .collect())
        }

        async fn get_company_addon(
            &self,
            company_id: &CompanyId,
            module_id: &ModuleId,
        ) -> Result<Option<CompanyAddOn>> {
            Ok(self
                .inner
                .company_addons
                .read()
                .unwrap()
                .iter()
                .find(|a| &a.company_id == company_id && &a.module_id == module_id)
                .cloned())
        }

        async fn save_company_addon(&self, addon: &CompanyAddOn) -> Result<()> {
            let mut addons = self.inner.company_addons.write().unwrap();
            match addons.iter_mut().find(|a| a.id == addon.id) {
                Some(existing) => *existing = addon.clone(),
                None => addons.push(addon.clone()),
            }
            Ok(())
        }

        async fn list_company_addons(&self, company_id: &CompanyId) -> Result<Vec<CompanyAddOn>> {
            Ok(self
                .inner
                .company_addons
                .read()
                .unwrap()
                .iter()
                .filter(|a| &a.company_id == company_id)
                .cloned()
                .collect())
        }

        async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
            Ok(self
                .inner
                .processed_events
                .read()
                .unwrap()
                .contains(event_id))
        }

        async fn mark_event_processed(&self, event_id: &str) -> Result<()> {
            self.inner
                .processed_events
                .write()
                .unwrap()
                .insert(event_id.to_string());
            Ok(())
        }
    }
}
