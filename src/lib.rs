//! Taskly billing - the billing and subscription core of the Sada Taskly
//! workspace platform.
//!
//! Companies subscribe to plans, buy add-on modules through a support
//! ticket's proposal workflow, and pay through an external checkout
//! gateway. This crate owns the commercial state machines:
//!
//! - **Catalog**: permissions with prices, modules (standard or add-on),
//!   plans with monthly/yearly cycles
//! - **Invoicing**: unique `INV/YYYYMMDD/XXXXX` numbering, payability
//!   windows, plan snapshots
//! - **Proposals**: `pending -> approved -> billed` (or `rejected`) per
//!   feature-request ticket, with billing issuance driven by a domain event
//! - **Payments**: gateway session creation with a bounded timeout, and
//!   idempotent webhook settlement
//! - **Subscriptions**: activation and extension with at most one active
//!   subscription per company, enforced by an aggregate
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use taskly_billing::ConfigBuilder;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize logging
//!     taskly_billing::init_tracing();
//!
//!     // Load configuration from TASKLY_* environment variables
//!     let config = ConfigBuilder::new().from_env().build().unwrap();
//!
//!     // Wire stores, managers, and the router; see the http module.
//!     let _ = config;
//! }
//! ```

pub mod auth;
pub mod billing;
pub mod catalog;
pub mod companies;
mod config;
mod error;
pub mod events;
pub mod http;
pub mod ids;
pub mod tickets;

// Re-exports for public API
pub use auth::{AuthContext, Capability, Role};
pub use billing::{
    BillingError, BillingManager, CompanyBillingState, Invoice, InvoiceAddOn, InvoiceStatus,
    PaymentGateway, PaymentNotification, PaymentStatus, SignatureVerifier, Subscription,
    SubscriptionStatus, WebhookHandler, WebhookOutcome,
};
pub use catalog::{BillingCycle, CatalogManager, Module, ModuleKind, Permission, Plan};
pub use companies::{Company, CompanyCategory, CompanyManager};
pub use config::{BillingConfig, Config, ConfigBuilder, GatewayConfig, LoggingConfig, ServerConfig};
pub use error::{ErrorResponse, Result, TasklyError};
pub use events::{DomainEvent, EventBus, EventHandler};
pub use http::{router, AppState};
pub use tickets::{ProposalStatus, ProposalWorkflow, Ticket, TicketProposal};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "taskly_billing=debug")
/// - `TASKLY_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("TASKLY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
