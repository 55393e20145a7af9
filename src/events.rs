//! Domain events for the billing core.
//!
//! Proposal approval fires [`DomainEvent::ProposalApproved`] so billing
//! issuance runs off an explicit event instead of a background scan over
//! approved-but-unbilled proposals.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::ids::{CompanyId, InvoiceAddOnId, ModuleId, ProposalId, SubscriptionId, TicketId};

/// Events emitted by billing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A company approved a proposal; billing issuance should follow.
    ProposalApproved {
        proposal_id: ProposalId,
        ticket_id: TicketId,
        company_id: CompanyId,
        module_id: ModuleId,
        amount: i64,
    },
    /// An add-on invoice was paid and the company add-on activated.
    AddOnActivated {
        invoice_add_on_id: InvoiceAddOnId,
        company_id: CompanyId,
        module_id: ModuleId,
    },
    /// A plan subscription was activated or extended.
    SubscriptionActivated {
        subscription_id: SubscriptionId,
        company_id: CompanyId,
    },
}

impl DomainEvent {
    /// Event kind as a string for structured logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProposalApproved { .. } => "proposal_approved",
            Self::AddOnActivated { .. } => "addon_activated",
            Self::SubscriptionActivated { .. } => "subscription_activated",
        }
    }
}

/// Handler for domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a single event.
    ///
    /// Handler failures are logged by the bus and never abort the operation
    /// that emitted the event; recovery sweeps pick up anything missed.
    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Dispatches events to registered handlers in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run in registration order.
    pub fn subscribe(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event to all handlers.
    pub async fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = %event.kind(), "publishing domain event");
        for handler in &self.handlers {
            if let Err(e) = handler.handle(&event).await {
                tracing::warn!(
                    event = %event.kind(),
                    error = %e,
                    "event handler failed; relying on recovery sweep"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<DomainEvent>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &DomainEvent) -> Result<()> {
            self.seen.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            Err(crate::error::TasklyError::internal("boom"))
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_handlers() {
        let recorder = Arc::new(RecordingHandler::default());
        let mut bus = EventBus::new();
        bus.subscribe(recorder.clone());

        let event = DomainEvent::SubscriptionActivated {
            subscription_id: SubscriptionId::new(),
            company_id: CompanyId::new(),
        };
        bus.publish(event.clone()).await;

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], event);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_dispatch() {
        let recorder = Arc::new(RecordingHandler::default());
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(FailingHandler));
        bus.subscribe(recorder.clone());

        bus.publish(DomainEvent::AddOnActivated {
            invoice_add_on_id: InvoiceAddOnId::new(),
            company_id: CompanyId::new(),
            module_id: ModuleId::new(),
        })
        .await;

        assert_eq!(recorder.seen.lock().await.len(), 1);
    }
}
