//! Payment gateway adapter.
//!
//! The core only consumes two things from the external checkout processor:
//! a "create payment session" call returning an opaque token, and
//! asynchronous payment-status callbacks. Implement [`PaymentGateway`] for
//! your provider; a mock implementation is available for testing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::BillingError;
use crate::error::Result;

/// A created checkout session.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    /// Opaque session token, stored on the invoice as `snap_token`.
    pub token: String,
    /// URL to send the payer to.
    pub redirect_url: String,
}

/// Payment status reported by a gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Pending,
    Failure,
}

impl PaymentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An asynchronous payment-status callback from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Gateway event ID, used for idempotent processing.
    pub event_id: String,
    /// The invoice number the payment refers to.
    pub reference: String,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
}

/// Client trait for the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment session for `amount` against invoice `reference`.
    ///
    /// The call must be bounded by the caller's timeout budget; on failure
    /// the invoice is left unpaid with no token and the user retries
    /// manually.
    async fn create_session(&self, reference: &str, amount: i64) -> Result<GatewaySession>;
}

/// Mock payment gateway for development and testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A mock gateway that mints deterministic-looking sessions and can be
    /// toggled to fail or hang.
    #[derive(Clone, Default)]
    pub struct MockPaymentGateway {
        fail: Arc<AtomicBool>,
        hang: Arc<AtomicBool>,
        sessions_created: Arc<AtomicUsize>,
    }

    impl MockPaymentGateway {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make subsequent `create_session` calls fail.
        pub fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        /// Make subsequent `create_session` calls hang past any timeout.
        pub fn set_hanging(&self, hanging: bool) {
            self.hang.store(hanging, Ordering::SeqCst);
        }

        /// Number of sessions successfully created.
        #[must_use]
        pub fn sessions_created(&self) -> usize {
            self.sessions_created.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentGateway for MockPaymentGateway {
        async fn create_session(&self, reference: &str, amount: i64) -> Result<GatewaySession> {
            if self.hang.load(Ordering::SeqCst) {
                // Longer than any sane timeout budget used in tests.
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(BillingError::GatewayFailed {
                    operation: "create_session".to_string(),
                    message: "mock gateway set to fail".to_string(),
                }
                .into());
            }

            self.sessions_created.fetch_add(1, Ordering::SeqCst);
            let token = format!("snap_{}", uuid::Uuid::new_v4().simple());

            tracing::debug!(
                reference = %reference,
                amount,
                "mock payment session created"
            );

            Ok(GatewaySession {
                redirect_url: format!("https://pay.example.test/session/{}", token),
                token,
            })
        }
    }
}
