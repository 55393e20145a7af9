//! Invoice issuing and payment-session management.

use chrono::{Duration, Utc};
use std::sync::Arc;

use super::addons::InvoiceAddOn;
use super::audit::{BillingAuditEvent, BillingAuditLogger, TracingAuditLogger};
use super::error::BillingError;
use super::gateway::{GatewaySession, PaymentGateway};
use super::invoice::{generate_invoice_number, Invoice, InvoiceStatus, PlanSnapshot};
use super::storage::BillingStore;
use super::subscription::Subscription;
use crate::auth::{AuthContext, Capability};
use crate::catalog::{BillingCycle, Plan};
use crate::config::Config;
use crate::error::{Result, TasklyError};
use crate::ids::{CompanyId, InvoiceAddOnId, InvoiceId, ModuleId, ProposalId};

/// Attempts at allocating a unique invoice number before giving up.
const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Manager for invoices, add-on invoices, and payment sessions.
///
/// Generic over the billing store, the payment gateway, and the audit
/// logger so tests can substitute in-memory fakes.
pub struct BillingManager<S, G, A = TracingAuditLogger> {
    store: S,
    gateway: Arc<G>,
    config: Config,
    audit: A,
}

impl<S: Clone, G, A: Clone> Clone for BillingManager<S, G, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            gateway: self.gateway.clone(),
            config: self.config.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<S: BillingStore, G: PaymentGateway> BillingManager<S, G> {
    #[must_use]
    pub fn new(store: S, gateway: Arc<G>, config: Config) -> Self {
        Self {
            store,
            gateway,
            config,
            audit: TracingAuditLogger,
        }
    }
}

impl<S: BillingStore, G: PaymentGateway, A: BillingAuditLogger> BillingManager<S, G, A> {
    /// Create a manager with a custom audit logger.
    #[must_use]
    pub fn with_audit(store: S, gateway: Arc<G>, config: Config, audit: A) -> Self {
        Self {
            store,
            gateway,
            config,
            audit,
        }
    }

    /// Issue an unpaid invoice for a plan purchase.
    ///
    /// The plan's name, price, and period are snapshotted onto the invoice
    /// so later plan edits leave history intact. The invoice number is
    /// allocated with a bounded retry loop against the store's uniqueness
    /// guarantee.
    pub async fn issue_plan_invoice(
        &self,
        ctx: &AuthContext,
        company_id: &CompanyId,
        plan: &Plan,
        cycle: BillingCycle,
    ) -> Result<Invoice> {
        ctx.require(Capability::ManageBilling)?;
        ctx.require_company(company_id)?;

        if !plan.is_active {
            return Err(BillingError::PlanNotFound {
                plan_id: plan.id.to_string(),
            }
            .into());
        }

        let snapshot = PlanSnapshot::capture(plan, cycle).ok_or(BillingError::CycleNotOffered {
            plan_id: plan.id.to_string(),
            cycle: cycle.as_str().to_string(),
        })?;

        if snapshot.amount == 0 {
            return Err(TasklyError::bad_request(
                "free plans do not require an invoice",
            ));
        }

        let now = Utc::now();
        let due_date = now + Duration::days(i64::from(self.config.billing.invoice_due_days));

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let invoice = Invoice {
                id: InvoiceId::new(),
                number: generate_invoice_number(now),
                company_id: company_id.clone(),
                plan: snapshot.clone(),
                status: InvoiceStatus::Unpaid,
                snap_token: None,
                payment_reference: None,
                payment_method: None,
                issued_at: now,
                due_date,
                paid_at: None,
            };

            match self.store.insert_invoice(&invoice).await {
                Ok(()) => {
                    tracing::info!(
                        company_id = %company_id,
                        number = %invoice.number,
                        amount = invoice.plan.amount,
                        "plan invoice issued"
                    );
                    self.audit
                        .log(BillingAuditEvent::InvoiceIssued {
                            company_id: company_id.to_string(),
                            number: invoice.number.clone(),
                            amount: invoice.plan.amount,
                        })
                        .await;
                    return Ok(invoice);
                }
                Err(TasklyError::Conflict(_)) => {
                    tracing::debug!(attempt, "invoice number collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(BillingError::NumberExhausted {
            attempts: MAX_NUMBER_ATTEMPTS,
        }
        .into())
    }

    /// Issue the add-on invoice for an approved proposal.
    ///
    /// Idempotent per proposal: if an invoice already exists (including one
    /// inserted by a concurrent caller), it is returned unchanged and no
    /// second document is created.
    pub async fn issue_addon_invoice(
        &self,
        company_id: &CompanyId,
        module_id: &ModuleId,
        proposal_id: &ProposalId,
        description: impl Into<String>,
        amount: i64,
    ) -> Result<InvoiceAddOn> {
        if amount <= 0 {
            return Err(TasklyError::validation(
                "amount",
                "must be greater than zero",
            ));
        }

        if let Some(existing) = self.store.get_add_on_invoice_by_proposal(proposal_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let due_date = now + Duration::days(i64::from(self.config.billing.invoice_due_days));
        let description = description.into();

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let invoice = InvoiceAddOn {
                id: InvoiceAddOnId::new(),
                number: generate_invoice_number(now),
                company_id: company_id.clone(),
                module_id: module_id.clone(),
                proposal_id: proposal_id.clone(),
                description: description.clone(),
                amount,
                status: InvoiceStatus::Unpaid,
                snap_token: None,
                payment_reference: None,
                payment_method: None,
                issued_at: now,
                due_date,
                paid_at: None,
            };

            match self.store.insert_add_on_invoice(&invoice).await {
                Ok(()) => {
                    tracing::info!(
                        company_id = %company_id,
                        number = %invoice.number,
                        proposal_id = %proposal_id,
                        amount,
                        "add-on invoice issued"
                    );
                    self.audit
                        .log(BillingAuditEvent::AddOnInvoiceIssued {
                            company_id: company_id.to_string(),
                            number: invoice.number.clone(),
                            proposal_id: proposal_id.to_string(),
                            amount,
                        })
                        .await;
                    return Ok(invoice);
                }
                Err(TasklyError::Conflict(_)) => {
                    // Either a number collision or another caller billed the
                    // proposal first; re-check before retrying the number.
                    if let Some(existing) =
                        self.store.get_add_on_invoice_by_proposal(proposal_id).await?
                    {
                        return Ok(existing);
                    }
                    tracing::debug!(attempt, "invoice number collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(BillingError::NumberExhausted {
            attempts: MAX_NUMBER_ATTEMPTS,
        }
        .into())
    }

    /// Create a gateway payment session for a plan invoice.
    ///
    /// On gateway failure or timeout the invoice keeps its unpaid status
    /// with no token; the caller retries manually.
    pub async fn start_invoice_payment(
        &self,
        ctx: &AuthContext,
        invoice_id: &InvoiceId,
    ) -> Result<GatewaySession> {
        ctx.require(Capability::ManageBilling)?;

        let mut invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound {
                reference: invoice_id.to_string(),
            })?;
        ctx.require_company(&invoice.company_id)?;

        let now = Utc::now();
        if !invoice.is_payable(now) {
            return Err(BillingError::InvoiceNotPayable {
                number: invoice.number.clone(),
                status: invoice.status.to_string(),
            }
            .into());
        }

        let session = self
            .create_session_bounded(&invoice.number, invoice.plan.amount)
            .await?;

        invoice.snap_token = Some(session.token.clone());
        self.store.update_invoice(&invoice).await?;

        self.audit
            .log(BillingAuditEvent::PaymentStarted {
                number: invoice.number.clone(),
                token: session.token.clone(),
            })
            .await;

        Ok(session)
    }

    /// Create a gateway payment session for an add-on invoice.
    pub async fn start_addon_payment(
        &self,
        ctx: &AuthContext,
        invoice_id: &InvoiceAddOnId,
    ) -> Result<GatewaySession> {
        ctx.require(Capability::ManageBilling)?;

        let mut invoice = self.store.get_add_on_invoice(invoice_id).await?.ok_or(
            BillingError::InvoiceNotFound {
                reference: invoice_id.to_string(),
            },
        )?;
        ctx.require_company(&invoice.company_id)?;

        let now = Utc::now();
        if !invoice.is_payable(now) {
            return Err(BillingError::InvoiceNotPayable {
                number: invoice.number.clone(),
                status: invoice.status.to_string(),
            }
            .into());
        }

        let session = self
            .create_session_bounded(&invoice.number, invoice.amount)
            .await?;

        invoice.snap_token = Some(session.token.clone());
        self.store.update_add_on_invoice(&invoice).await?;

        self.audit
            .log(BillingAuditEvent::PaymentStarted {
                number: invoice.number.clone(),
                token: session.token.clone(),
            })
            .await;

        Ok(session)
    }

    /// Call the gateway with the configured timeout budget.
    async fn create_session_bounded(&self, number: &str, amount: i64) -> Result<GatewaySession> {
        let budget =
            std::time::Duration::from_secs(self.config.gateway.request_timeout_seconds);

        let result = tokio::time::timeout(budget, self.gateway.create_session(number, amount)).await;

        match result {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => {
                tracing::warn!(number = %number, error = %e, "gateway session creation failed");
                self.audit
                    .log(BillingAuditEvent::PaymentStartFailed {
                        number: number.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
                Err(e)
            }
            Err(_) => {
                tracing::warn!(number = %number, "gateway session creation timed out");
                self.audit
                    .log(BillingAuditEvent::PaymentStartFailed {
                        number: number.to_string(),
                        reason: "timeout".to_string(),
                    })
                    .await;
                Err(BillingError::GatewayTimeout {
                    operation: "create_session".to_string(),
                }
                .into())
            }
        }
    }

    /// Look up an invoice by its human-facing number.
    pub async fn invoice_by_number(&self, number: &str) -> Result<Invoice> {
        self.store
            .get_invoice_by_number(number)
            .await?
            .ok_or_else(|| {
                BillingError::InvoiceNotFound {
                    reference: number.to_string(),
                }
                .into()
            })
    }

    /// List all invoices for a company, newest first.
    pub async fn invoices_for_company(&self, company_id: &CompanyId) -> Result<Vec<Invoice>> {
        self.store.invoices_for_company(company_id).await
    }

    /// The company's active subscription, if any.
    pub async fn active_subscription(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<Subscription>> {
        self.store.get_active_subscription(company_id).await
    }

    /// Active subscriptions ending within the configured reminder window.
    pub async fn subscriptions_expiring_soon(&self) -> Result<Vec<Subscription>> {
        self.store
            .subscriptions_expiring_soon(Utc::now(), self.config.billing.expiring_soon_days)
            .await
    }

    /// Whether the company currently has access to an add-on module.
    pub async fn company_has_addon(
        &self,
        company_id: &CompanyId,
        module_id: &ModuleId,
    ) -> Result<bool> {
        let now = Utc::now();
        Ok(self
            .store
            .get_company_addon(company_id, module_id)
            .await?
            .map_or(false, |a| a.is_currently_active(now)))
    }
}
