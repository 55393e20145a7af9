//! Billing for plan subscriptions and module add-ons.
//!
//! Provides invoice issuing with unique numbering, payment-gateway session
//! creation, idempotent payment webhooks, subscription activation with the
//! one-active-per-company invariant, and add-on activation.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskly_billing::billing::{BillingManager, WebhookHandler};
//!
//! let billing = BillingManager::new(store.clone(), gateway, config.clone());
//!
//! // Issue an invoice for a plan purchase
//! let invoice = billing
//!     .issue_plan_invoice(&ctx, &company_id, &plan, BillingCycle::Monthly)
//!     .await?;
//!
//! // Start a payment; the gateway token is stored on the invoice
//! let session = billing.start_invoice_payment(&ctx, &invoice.id).await?;
//!
//! // Later, the gateway calls back and the webhook handler settles it
//! let handler = WebhookHandler::new(store, config, webhook_secret);
//! handler.handle_notification(notification).await?;
//! ```

pub mod audit;
pub mod error;
pub mod gateway;
pub mod invoice;
pub mod addons;
pub mod manager;
pub mod storage;
pub mod subscription;
pub mod webhook;

// Invoice exports
pub use invoice::{generate_invoice_number, Invoice, InvoiceStatus, PlanSnapshot};

// Add-on exports
pub use addons::{CompanyAddOn, InvoiceAddOn};

// Subscription exports
pub use subscription::{Activation, CompanyBillingState, Subscription, SubscriptionStatus};

// Storage exports
pub use storage::BillingStore;

// Gateway exports
pub use gateway::{GatewaySession, PaymentGateway, PaymentNotification, PaymentStatus};

// Manager exports
pub use manager::BillingManager;

// Webhook exports
pub use webhook::{SignatureVerifier, WebhookHandler, WebhookOutcome};

// Audit exports
pub use audit::{BillingAuditEvent, BillingAuditLogger, NoOpAuditLogger, TracingAuditLogger};

// Error exports
pub use error::BillingError;

// Test exports
#[cfg(any(test, feature = "test-support"))]
pub use storage::test::InMemoryBillingStore;

#[cfg(any(test, feature = "test-support"))]
pub use gateway::test::MockPaymentGateway;
