//! Payment gateway webhook handling.
//!
//! Verifies callback signatures, settles invoices, and drives the
//! downstream activations (subscription or company add-on). Processing is
//! idempotent twice over: gateway event IDs are deduplicated in the store,
//! and a "paid" transition on an already-paid invoice is a no-op, so
//! redelivered notifications never double-activate anything.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::addons::CompanyAddOn;
use super::audit::{BillingAuditEvent, BillingAuditLogger, TracingAuditLogger};
use super::error::BillingError;
use super::gateway::{PaymentNotification, PaymentStatus};
use super::storage::BillingStore;
use super::subscription::{Activation, CompanyBillingState};
use crate::config::Config;
use crate::error::Result;
use crate::events::{DomainEvent, EventBus};

/// Maximum accepted age of a webhook signature, in seconds.
const SIGNATURE_MAX_AGE_SECONDS: i64 = 300;

/// Outcome of webhook processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Notification was processed and state updated.
    Processed,
    /// Notification referenced nothing we bill for.
    Ignored,
    /// Notification was already processed (idempotency).
    AlreadyProcessed,
}

impl WebhookOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Ignored => "ignored",
            Self::AlreadyProcessed => "already_processed",
        }
    }
}

/// Verifies gateway callback signatures.
///
/// The gateway signs `"{timestamp}.{body}"` with HMAC-SHA256 and sends
/// `t={timestamp},v1={hex}` in the signature header. The secret is held in
/// [`SecretString`] so it never shows up in debug output.
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    #[must_use]
    pub fn new(secret: impl Into<SecretString>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify the signature header and parse the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed, the timestamp is
    /// outside the replay window, the signature does not match, or the
    /// payload is not a valid notification.
    pub fn verify(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentNotification> {
        let parts = parse_signature_header(signature)?;

        let age = (now.timestamp() - parts.timestamp).abs();
        if age > SIGNATURE_MAX_AGE_SECONDS {
            return Err(BillingError::SignatureExpired { age_seconds: age }.into());
        }

        let signed_payload = format!("{}.{}", parts.timestamp, String::from_utf8_lossy(payload));
        let expected = compute_signature(self.secret.expose_secret(), signed_payload.as_bytes())?;

        let expected_bytes = hex::decode(&expected)
            .map_err(|_| crate::error::TasklyError::internal("hex encode error"))?;
        let provided_bytes = hex::decode(&parts.signature)
            .map_err(|_| BillingError::InvalidSignature)?;

        if expected_bytes.ct_eq(&provided_bytes).unwrap_u8() != 1 {
            return Err(BillingError::InvalidSignature.into());
        }

        let notification: PaymentNotification = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "failed to parse webhook payload");
            BillingError::InvalidPayload {
                message: "malformed JSON payload".to_string(),
            }
        })?;

        Ok(notification)
    }
}

/// Parsed signature header parts.
struct SignatureParts {
    timestamp: i64,
    signature: String,
}

/// Parse the `t=...,v1=...` signature header.
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or(BillingError::InvalidPayload {
                message: "invalid signature header format".to_string(),
            })?;

        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {} // Ignore other versions
        }
    }

    Ok(SignatureParts {
        timestamp: timestamp.ok_or(BillingError::InvalidPayload {
            message: "missing timestamp in signature".to_string(),
        })?,
        signature: signature.ok_or(BillingError::InvalidPayload {
            message: "missing v1 signature".to_string(),
        })?,
    })
}

/// Compute an HMAC-SHA256 signature, hex encoded.
pub(crate) fn compute_signature(secret: &str, payload: &[u8]) -> Result<String> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| crate::error::TasklyError::internal("HMAC key error"))?;
    mac.update(payload);

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Webhook handler for payment notifications.
pub struct WebhookHandler<S, A = TracingAuditLogger> {
    store: S,
    config: Config,
    events: EventBus,
    audit: A,
}

impl<S: BillingStore> WebhookHandler<S> {
    #[must_use]
    pub fn new(store: S, config: Config, events: EventBus) -> Self {
        Self {
            store,
            config,
            events,
            audit: TracingAuditLogger,
        }
    }
}

impl<S: BillingStore, A: BillingAuditLogger> WebhookHandler<S, A> {
    /// Create a handler with a custom audit logger.
    #[must_use]
    pub fn with_audit(store: S, config: Config, events: EventBus, audit: A) -> Self {
        Self {
            store,
            config,
            events,
            audit,
        }
    }

    /// Process a verified payment notification.
    ///
    /// Routing is by invoice number carried in `reference`: plan invoices
    /// and add-on invoices are tried in that order. Redelivery is a
    /// recoverable no-op, never an error.
    pub async fn handle_notification(
        &self,
        notification: PaymentNotification,
    ) -> Result<WebhookOutcome> {
        self.audit
            .log(BillingAuditEvent::WebhookReceived {
                event_id: notification.event_id.clone(),
                reference: notification.reference.clone(),
                status: notification.status.to_string(),
            })
            .await;

        if self.store.is_event_processed(&notification.event_id).await? {
            tracing::debug!(
                event_id = %notification.event_id,
                "webhook event already processed"
            );
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = if self
            .store
            .get_invoice_by_number(&notification.reference)
            .await?
            .is_some()
        {
            self.settle_plan_invoice(&notification).await?
        } else if self
            .store
            .get_add_on_invoice_by_number(&notification.reference)
            .await?
            .is_some()
        {
            self.settle_addon_invoice(&notification).await?
        } else {
            tracing::warn!(
                reference = %notification.reference,
                "webhook references an unknown invoice"
            );
            WebhookOutcome::Ignored
        };

        // Mark as processed (only for non-ignored events)
        if outcome != WebhookOutcome::Ignored {
            self.store
                .mark_event_processed(&notification.event_id)
                .await?;
        }

        self.audit
            .log(BillingAuditEvent::WebhookProcessed {
                event_id: notification.event_id.clone(),
                outcome: outcome.as_str().to_string(),
            })
            .await;

        Ok(outcome)
    }

    /// Settle a plan invoice and activate the subscription.
    async fn settle_plan_invoice(
        &self,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome> {
        let mut invoice = match self
            .store
            .get_invoice_by_number(&notification.reference)
            .await?
        {
            Some(invoice) => invoice,
            None => return Ok(WebhookOutcome::Ignored),
        };

        match notification.status {
            PaymentStatus::Pending => {
                tracing::debug!(number = %invoice.number, "payment pending, no state change");
                return Ok(WebhookOutcome::Processed);
            }
            PaymentStatus::Failure => {
                tracing::warn!(number = %invoice.number, "payment failed, invoice stays unpaid");
                return Ok(WebhookOutcome::Processed);
            }
            PaymentStatus::Success => {}
        }

        if invoice.status == super::invoice::InvoiceStatus::Paid {
            // A redelivered success under a fresh event ID; nothing to do.
            tracing::debug!(number = %invoice.number, "invoice already paid");
            return Ok(WebhookOutcome::Processed);
        }

        let now = Utc::now();
        invoice.mark_paid(
            payment_reference(notification),
            payment_method(notification),
            now,
        );
        self.store.update_invoice(&invoice).await?;

        self.audit
            .log(BillingAuditEvent::InvoicePaid {
                number: invoice.number.clone(),
                payment_reference: payment_reference(notification),
            })
            .await;

        // Activate through the aggregate so at most one subscription stays
        // active for the company.
        let active = self
            .store
            .get_active_subscription(&invoice.company_id)
            .await?;
        let state = CompanyBillingState::new(invoice.company_id.clone(), active);
        let activation = state.activate(&invoice, now);
        self.store.commit_activation(&activation).await?;

        let subscription = activation.subscription();
        let extended = matches!(activation, Activation::Extended(_));

        tracing::info!(
            company_id = %invoice.company_id,
            subscription_id = %subscription.id,
            extended,
            "subscription activated"
        );
        self.audit
            .log(BillingAuditEvent::SubscriptionActivated {
                company_id: invoice.company_id.to_string(),
                subscription_id: subscription.id.to_string(),
                plan_id: subscription.plan_id.to_string(),
                extended,
            })
            .await;

        self.events
            .publish(DomainEvent::SubscriptionActivated {
                subscription_id: subscription.id.clone(),
                company_id: invoice.company_id.clone(),
            })
            .await;

        Ok(WebhookOutcome::Processed)
    }

    /// Settle an add-on invoice and activate the company add-on.
    async fn settle_addon_invoice(
        &self,
        notification: &PaymentNotification,
    ) -> Result<WebhookOutcome> {
        let mut invoice = match self
            .store
            .get_add_on_invoice_by_number(&notification.reference)
            .await?
        {
            Some(invoice) => invoice,
            None => return Ok(WebhookOutcome::Ignored),
        };

        match notification.status {
            PaymentStatus::Pending => {
                tracing::debug!(number = %invoice.number, "payment pending, no state change");
                return Ok(WebhookOutcome::Processed);
            }
            PaymentStatus::Failure => {
                tracing::warn!(number = %invoice.number, "payment failed, invoice stays unpaid");
                return Ok(WebhookOutcome::Processed);
            }
            PaymentStatus::Success => {}
        }

        if invoice.status == super::invoice::InvoiceStatus::Paid {
            tracing::debug!(number = %invoice.number, "add-on invoice already paid");
            return Ok(WebhookOutcome::Processed);
        }

        let now = Utc::now();
        invoice.mark_paid(
            payment_reference(notification),
            payment_method(notification),
            now,
        );
        self.store.update_add_on_invoice(&invoice).await?;

        self.audit
            .log(BillingAuditEvent::InvoicePaid {
                number: invoice.number.clone(),
                payment_reference: payment_reference(notification),
            })
            .await;

        // Create or reactivate the activation record; never a second row
        // for the same company/module pair.
        let duration = self.config.billing.addon_duration_days;
        match self
            .store
            .get_company_addon(&invoice.company_id, &invoice.module_id)
            .await?
        {
            Some(mut addon) => {
                addon.reactivate(duration, now);
                self.store.save_company_addon(&addon).await?;
            }
            None => {
                let addon = CompanyAddOn::activate(
                    invoice.company_id.clone(),
                    invoice.module_id.clone(),
                    duration,
                    now,
                );
                self.store.save_company_addon(&addon).await?;
            }
        }

        tracing::info!(
            company_id = %invoice.company_id,
            module_id = %invoice.module_id,
            "company add-on activated"
        );
        self.audit
            .log(BillingAuditEvent::AddOnActivated {
                company_id: invoice.company_id.to_string(),
                module_id: invoice.module_id.to_string(),
            })
            .await;

        self.events
            .publish(DomainEvent::AddOnActivated {
                invoice_add_on_id: invoice.id.clone(),
                company_id: invoice.company_id.clone(),
                module_id: invoice.module_id.clone(),
            })
            .await;

        Ok(WebhookOutcome::Processed)
    }
}

fn payment_reference(notification: &PaymentNotification) -> String {
    notification
        .transaction_id
        .clone()
        .unwrap_or_else(|| notification.event_id.clone())
}

fn payment_method(notification: &PaymentNotification) -> String {
    notification
        .payment_method
        .clone()
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::invoice::{InvoiceStatus, PlanSnapshot};
    use crate::billing::storage::test::InMemoryBillingStore;
    use crate::billing::{Invoice, InvoiceAddOn};
    use crate::catalog::BillingCycle;
    use crate::config::ConfigBuilder;
    use crate::ids::{CompanyId, InvoiceAddOnId, InvoiceId, ModuleId, PlanId, ProposalId};
    use chrono::Duration;

    fn config() -> Config {
        ConfigBuilder::new().build().unwrap()
    }

    fn handler(store: InMemoryBillingStore) -> WebhookHandler<InMemoryBillingStore> {
        WebhookHandler::new(store, config(), EventBus::new())
    }

    fn plan_invoice(company_id: &CompanyId) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId::new(),
            number: "INV/20260807/PLAN1".to_string(),
            company_id: company_id.clone(),
            plan: PlanSnapshot {
                plan_id: PlanId::new(),
                plan_name: "Team".to_string(),
                amount: 100_000,
                duration_days: 30,
                cycle: BillingCycle::Monthly,
            },
            status: InvoiceStatus::Unpaid,
            snap_token: Some("snap_1".to_string()),
            payment_reference: None,
            payment_method: None,
            issued_at: now,
            due_date: now + Duration::days(1),
            paid_at: None,
        }
    }

    fn addon_invoice(company_id: &CompanyId, module_id: &ModuleId) -> InvoiceAddOn {
        let now = Utc::now();
        InvoiceAddOn {
            id: InvoiceAddOnId::new(),
            number: "INV/20260807/ADDN1".to_string(),
            company_id: company_id.clone(),
            module_id: module_id.clone(),
            proposal_id: ProposalId::new(),
            description: "Time Tracking add-on".to_string(),
            amount: 500_000,
            status: InvoiceStatus::Unpaid,
            snap_token: Some("snap_2".to_string()),
            payment_reference: None,
            payment_method: None,
            issued_at: now,
            due_date: now + Duration::days(1),
            paid_at: None,
        }
    }

    fn success(event_id: &str, reference: &str) -> PaymentNotification {
        PaymentNotification {
            event_id: event_id.to_string(),
            reference: reference.to_string(),
            status: PaymentStatus::Success,
            payment_method: Some("bank_transfer".to_string()),
            transaction_id: Some(format!("trx-{}", event_id)),
        }
    }

    #[tokio::test]
    async fn test_success_marks_paid_and_activates_subscription() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let invoice = plan_invoice(&company);
        store.insert_invoice(&invoice).await.unwrap();

        let handler = handler(store.clone());
        let outcome = handler
            .handle_notification(success("evt_1", &invoice.number))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let paid = store.get_invoice(&invoice.id).await.unwrap().unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.payment_method.as_deref(), Some("bank_transfer"));
        assert!(paid.paid_at.is_some());

        let sub = store.get_active_subscription(&company).await.unwrap();
        assert!(sub.is_some());
    }

    #[tokio::test]
    async fn test_replayed_event_id_is_a_noop() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let invoice = plan_invoice(&company);
        store.insert_invoice(&invoice).await.unwrap();

        let handler = handler(store.clone());
        let notification = success("evt_replay", &invoice.number);

        let first = handler.handle_notification(notification.clone()).await.unwrap();
        assert_eq!(first, WebhookOutcome::Processed);

        let second = handler.handle_notification(notification).await.unwrap();
        assert_eq!(second, WebhookOutcome::AlreadyProcessed);

        assert_eq!(store.all_subscriptions_for(&company).len(), 1);
    }

    #[tokio::test]
    async fn test_redelivered_success_under_fresh_event_id_is_a_noop() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let module = ModuleId::new();
        let invoice = addon_invoice(&company, &module);
        store.insert_add_on_invoice(&invoice).await.unwrap();

        let handler = handler(store.clone());
        handler
            .handle_notification(success("evt_a", &invoice.number))
            .await
            .unwrap();

        let paid_at_first = store
            .get_add_on_invoice(&invoice.id)
            .await
            .unwrap()
            .unwrap()
            .paid_at;
        let addons_first = store.list_company_addons(&company).await.unwrap();
        assert_eq!(addons_first.len(), 1);
        let started_first = addons_first[0].started_at;

        // Same payment, new gateway event ID.
        handler
            .handle_notification(success("evt_b", &invoice.number))
            .await
            .unwrap();

        let settled = store
            .get_add_on_invoice(&invoice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled.paid_at, paid_at_first);
        assert_eq!(
            settled.payment_reference.as_deref(),
            Some("trx-evt_a"),
            "reference from the first application must stick"
        );

        let addons = store.list_company_addons(&company).await.unwrap();
        assert_eq!(addons.len(), 1, "no duplicate activation row");
        assert_eq!(addons[0].started_at, started_first);
    }

    #[tokio::test]
    async fn test_addon_payment_activates_company_addon() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let module = ModuleId::new();
        let invoice = addon_invoice(&company, &module);
        store.insert_add_on_invoice(&invoice).await.unwrap();

        let handler = handler(store.clone());
        handler
            .handle_notification(success("evt_1", &invoice.number))
            .await
            .unwrap();

        let addon = store
            .get_company_addon(&company, &module)
            .await
            .unwrap()
            .unwrap();
        assert!(addon.is_active);
        assert!(addon.is_currently_active(Utc::now()));
        // Default config grants 30 days.
        assert!(addon.expired_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_leaves_invoice_unpaid() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let invoice = plan_invoice(&company);
        store.insert_invoice(&invoice).await.unwrap();

        let handler = handler(store.clone());
        let outcome = handler
            .handle_notification(PaymentNotification {
                event_id: "evt_fail".to_string(),
                reference: invoice.number.clone(),
                status: PaymentStatus::Failure,
                payment_method: None,
                transaction_id: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Processed);

        let stored = store.get_invoice(&invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::Unpaid);
        assert!(store.get_active_subscription(&company).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_reference_is_ignored() {
        let handler = handler(InMemoryBillingStore::new());
        let outcome = handler
            .handle_notification(success("evt_x", "INV/20260807/NOPE1"))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_one_active_subscription_after_plan_change() {
        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();

        let first = plan_invoice(&company);
        store.insert_invoice(&first).await.unwrap();

        let mut second = plan_invoice(&company);
        second.id = InvoiceId::new();
        second.number = "INV/20260807/PLAN2".to_string();
        second.plan.plan_id = PlanId::new();
        second.plan.duration_days = 365;
        second.plan.cycle = BillingCycle::Yearly;
        store.insert_invoice(&second).await.unwrap();

        let handler = handler(store.clone());
        handler
            .handle_notification(success("evt_1", &first.number))
            .await
            .unwrap();
        handler
            .handle_notification(success("evt_2", &second.number))
            .await
            .unwrap();

        let all = store.all_subscriptions_for(&company);
        assert_eq!(all.len(), 2);
        let active: Vec<_> = all
            .iter()
            .filter(|s| s.status == crate::billing::SubscriptionStatus::Active)
            .collect();
        assert_eq!(active.len(), 1, "exactly one active subscription");
        assert_eq!(active[0].plan_id, second.plan.plan_id);
    }

    mod signatures {
        use super::*;

        fn signed(secret: &str, payload: &str, timestamp: i64) -> String {
            let signed_payload = format!("{}.{}", timestamp, payload);
            let sig = compute_signature(secret, signed_payload.as_bytes()).unwrap();
            format!("t={},v1={}", timestamp, sig)
        }

        fn notification_json() -> String {
            serde_json::json!({
                "event_id": "evt_1",
                "reference": "INV/20260807/PLAN1",
                "status": "success",
                "payment_method": "bank_transfer",
                "transaction_id": "trx-1",
            })
            .to_string()
        }

        #[test]
        fn test_valid_signature() {
            let verifier = SignatureVerifier::new("whsec_test".to_string());
            let payload = notification_json();
            let now = Utc::now();
            let header = signed("whsec_test", &payload, now.timestamp());

            let notification = verifier.verify(payload.as_bytes(), &header, now).unwrap();
            assert_eq!(notification.reference, "INV/20260807/PLAN1");
            assert_eq!(notification.status, PaymentStatus::Success);
        }

        #[test]
        fn test_wrong_secret_rejected() {
            let verifier = SignatureVerifier::new("whsec_test".to_string());
            let payload = notification_json();
            let now = Utc::now();
            let header = signed("whsec_other", &payload, now.timestamp());

            assert!(verifier.verify(payload.as_bytes(), &header, now).is_err());
        }

        #[test]
        fn test_tampered_payload_rejected() {
            let verifier = SignatureVerifier::new("whsec_test".to_string());
            let payload = notification_json();
            let now = Utc::now();
            let header = signed("whsec_test", &payload, now.timestamp());

            let tampered = payload.replace("success", "failure");
            assert!(verifier.verify(tampered.as_bytes(), &header, now).is_err());
        }

        #[test]
        fn test_stale_timestamp_rejected() {
            let verifier = SignatureVerifier::new("whsec_test".to_string());
            let payload = notification_json();
            let now = Utc::now();
            let stale = now.timestamp() - 3600;
            let header = signed("whsec_test", &payload, stale);

            assert!(verifier.verify(payload.as_bytes(), &header, now).is_err());
        }

        #[test]
        fn test_malformed_header_rejected() {
            let verifier = SignatureVerifier::new("whsec_test".to_string());
            let payload = notification_json();
            assert!(verifier
                .verify(payload.as_bytes(), "not-a-header", Utc::now())
                .is_err());
        }
    }
}
