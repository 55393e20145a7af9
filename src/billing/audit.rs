//! Audit logging for billing operations.
//!
//! Trait-based audit trail for billing events, useful for compliance and
//! debugging payment disputes.

use async_trait::async_trait;
use std::fmt;

/// Audit event types for billing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAuditEvent {
    /// Plan invoice issued.
    InvoiceIssued {
        company_id: String,
        number: String,
        amount: i64,
    },
    /// Add-on invoice issued for an approved proposal.
    AddOnInvoiceIssued {
        company_id: String,
        number: String,
        proposal_id: String,
        amount: i64,
    },
    /// Payment session created at the gateway.
    PaymentStarted {
        number: String,
        token: String,
    },
    /// Payment session creation failed; invoice left unpaid.
    PaymentStartFailed {
        number: String,
        reason: String,
    },
    /// Invoice settled by a gateway notification.
    InvoicePaid {
        number: String,
        payment_reference: String,
    },
    /// Subscription activated or extended.
    SubscriptionActivated {
        company_id: String,
        subscription_id: String,
        plan_id: String,
        extended: bool,
    },
    /// Company add-on activated.
    AddOnActivated {
        company_id: String,
        module_id: String,
    },
    /// Webhook received from the gateway.
    WebhookReceived {
        event_id: String,
        reference: String,
        status: String,
    },
    /// Webhook fully processed.
    WebhookProcessed {
        event_id: String,
        outcome: String,
    },
}

impl fmt::Display for BillingAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvoiceIssued { company_id, number, amount } => {
                write!(f, "Invoice issued: company={}, number={}, amount={}", company_id, number, amount)
            }
            Self::AddOnInvoiceIssued { company_id, number, proposal_id, amount } => {
                write!(f, "Add-on invoice issued: company={}, number={}, proposal={}, amount={}", company_id, number, proposal_id, amount)
            }
            Self::PaymentStarted { number, token } => {
                write!(f, "Payment started: number={}, token={}", number, token)
            }
            Self::PaymentStartFailed { number, reason } => {
                write!(f, "Payment start failed: number={}, reason={}", number, reason)
            }
            Self::InvoicePaid { number, payment_reference } => {
                write!(f, "Invoice paid: number={}, reference={}", number, payment_reference)
            }
            Self::SubscriptionActivated { company_id, subscription_id, plan_id, extended } => {
                write!(f, "Subscription activated: company={}, sub={}, plan={}, extended={}", company_id, subscription_id, plan_id, extended)
            }
            Self::AddOnActivated { company_id, module_id } => {
                write!(f, "Add-on activated: company={}, module={}", company_id, module_id)
            }
            Self::WebhookReceived { event_id, reference, status } => {
                write!(f, "Webhook received: event={}, reference={}, status={}", event_id, reference, status)
            }
            Self::WebhookProcessed { event_id, outcome } => {
                write!(f, "Webhook processed: event={}, outcome={}", event_id, outcome)
            }
        }
    }
}

/// Trait for audit logging backends.
///
/// Implementations should handle failures gracefully to avoid disrupting
/// billing operations.
#[async_trait]
pub trait BillingAuditLogger: Send + Sync {
    /// Log a billing audit event.
    async fn log(&self, event: BillingAuditEvent);
}

/// No-op audit logger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

#[async_trait]
impl BillingAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: BillingAuditEvent) {
        // No-op
    }
}

/// Tracing-based audit logger.
///
/// Logs audit events using the `tracing` crate at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

#[async_trait]
impl BillingAuditLogger for TracingAuditLogger {
    async fn log(&self, event: BillingAuditEvent) {
        tracing::info!(
            target: "taskly::billing::audit",
            event_type = %event_kind(&event),
            "{}", event
        );
    }
}

/// Get the event kind as a string for structured logging.
fn event_kind(event: &BillingAuditEvent) -> &'static str {
    match event {
        BillingAuditEvent::InvoiceIssued { .. } => "invoice_issued",
        BillingAuditEvent::AddOnInvoiceIssued { .. } => "addon_invoice_issued",
        BillingAuditEvent::PaymentStarted { .. } => "payment_started",
        BillingAuditEvent::PaymentStartFailed { .. } => "payment_start_failed",
        BillingAuditEvent::InvoicePaid { .. } => "invoice_paid",
        BillingAuditEvent::SubscriptionActivated { .. } => "subscription_activated",
        BillingAuditEvent::AddOnActivated { .. } => "addon_activated",
        BillingAuditEvent::WebhookReceived { .. } => "webhook_received",
        BillingAuditEvent::WebhookProcessed { .. } => "webhook_processed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Test audit logger that captures events.
    #[derive(Default)]
    pub struct TestAuditLogger {
        pub events: Arc<Mutex<Vec<BillingAuditEvent>>>,
    }

    impl TestAuditLogger {
        pub async fn events(&self) -> Vec<BillingAuditEvent> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl BillingAuditLogger for TestAuditLogger {
        async fn log(&self, event: BillingAuditEvent) {
            self.events.lock().await.push(event);
        }
    }

    #[tokio::test]
    async fn test_capture_events() {
        let logger = TestAuditLogger::default();

        logger
            .log(BillingAuditEvent::InvoiceIssued {
                company_id: "c1".to_string(),
                number: "INV/20260807/AB12C".to_string(),
                amount: 150_000,
            })
            .await;
        logger
            .log(BillingAuditEvent::WebhookProcessed {
                event_id: "evt_1".to_string(),
                outcome: "processed".to_string(),
            })
            .await;

        let events = logger.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BillingAuditEvent::InvoiceIssued { .. }));
    }

    #[test]
    fn test_event_display() {
        let event = BillingAuditEvent::InvoicePaid {
            number: "INV/20260807/AB12C".to_string(),
            payment_reference: "trx-42".to_string(),
        };
        let display = format!("{}", event);
        assert!(display.contains("INV/20260807/AB12C"));
        assert!(display.contains("trx-42"));
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(
            event_kind(&BillingAuditEvent::PaymentStarted {
                number: String::new(),
                token: String::new(),
            }),
            "payment_started"
        );
    }
}
