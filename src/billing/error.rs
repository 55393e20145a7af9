//! Billing-specific error types.
//!
//! Provides granular error types for billing operations, enabling better
//! error handling and more informative messages for API consumers.

use std::fmt;

/// Billing-specific errors.
///
/// These errors provide more context than generic errors and can be
/// converted to `TasklyError` for HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    // Plan errors
    /// The specified plan was not found or is not offered.
    PlanNotFound { plan_id: String },
    /// The plan does not offer the requested billing cycle.
    CycleNotOffered { plan_id: String, cycle: String },

    // Invoice errors
    /// Invoice not found.
    InvoiceNotFound { reference: String },
    /// The invoice is not payable (wrong status or past due).
    InvoiceNotPayable { number: String, status: String },
    /// Number generation kept colliding with existing invoices.
    NumberExhausted { attempts: u32 },

    // Proposal billing errors
    /// The proposal already has an invoice attached.
    ProposalAlreadyBilled { proposal_id: String },

    // Subscription errors
    /// No subscription found for the company.
    NoSubscription { company_id: String },

    // Add-on errors
    /// The module is not an active add-on.
    ModuleNotBillable { module_id: String },

    // Gateway errors
    /// The payment gateway rejected or failed the request.
    GatewayFailed { operation: String, message: String },
    /// The gateway call exceeded its timeout budget.
    GatewayTimeout { operation: String },

    // Webhook errors
    /// Webhook signature is invalid.
    InvalidSignature,
    /// Webhook timestamp is too old (replay-attack protection).
    SignatureExpired { age_seconds: i64 },
    /// Webhook payload is malformed.
    InvalidPayload { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanNotFound { plan_id } => {
                write!(f, "Plan not found: {}", plan_id)
            }
            Self::CycleNotOffered { plan_id, cycle } => {
                write!(f, "Plan '{}' is not offered on a {} cycle", plan_id, cycle)
            }
            Self::InvoiceNotFound { reference } => {
                write!(f, "Invoice not found: {}", reference)
            }
            Self::InvoiceNotPayable { number, status } => {
                write!(f, "Invoice {} is not payable (status: {})", number, status)
            }
            Self::NumberExhausted { attempts } => {
                write!(f, "Could not allocate a unique invoice number after {} attempts", attempts)
            }
            Self::ProposalAlreadyBilled { proposal_id } => {
                write!(f, "Proposal {} already has an invoice", proposal_id)
            }
            Self::NoSubscription { company_id } => {
                write!(f, "No subscription found for company {}", company_id)
            }
            Self::ModuleNotBillable { module_id } => {
                write!(f, "Module {} is not an active add-on", module_id)
            }
            Self::GatewayFailed { operation, message } => {
                write!(f, "Payment gateway error during '{}': {}", operation, message)
            }
            Self::GatewayTimeout { operation } => {
                write!(f, "Payment gateway timed out during '{}'", operation)
            }
            Self::InvalidSignature => {
                write!(f, "Invalid webhook signature")
            }
            Self::SignatureExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({} seconds old)", age_seconds)
            }
            Self::InvalidPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::TasklyError {
    fn from(err: BillingError) -> Self {
        match &err {
            // Map to NotFound
            BillingError::PlanNotFound { .. }
            | BillingError::InvoiceNotFound { .. }
            | BillingError::NoSubscription { .. } => {
                crate::error::TasklyError::NotFound(err.to_string())
            }

            // Map to Conflict (double-billing and state races)
            BillingError::ProposalAlreadyBilled { .. } => {
                crate::error::TasklyError::Conflict(err.to_string())
            }

            // Map to BadRequest (client errors)
            BillingError::CycleNotOffered { .. }
            | BillingError::InvoiceNotPayable { .. }
            | BillingError::ModuleNotBillable { .. }
            | BillingError::InvalidSignature
            | BillingError::SignatureExpired { .. }
            | BillingError::InvalidPayload { .. } => {
                crate::error::TasklyError::BadRequest(err.to_string())
            }

            // Gateway failures surface as retryable upstream errors
            BillingError::GatewayFailed { .. } => {
                crate::error::TasklyError::ServiceUnavailable(err.to_string())
            }
            BillingError::GatewayTimeout { .. } => crate::error::TasklyError::RequestTimeout,

            // Map to Internal
            BillingError::NumberExhausted { .. } => {
                crate::error::TasklyError::Internal(err.to_string())
            }
        }
    }
}

impl BillingError {
    /// Check if the caller may usefully retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayFailed { .. } | Self::GatewayTimeout { .. } | Self::NumberExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TasklyError;

    #[test]
    fn test_error_display() {
        let err = BillingError::InvoiceNotPayable {
            number: "INV/20260807/AB12C".to_string(),
            status: "expired".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invoice INV/20260807/AB12C is not payable (status: expired)"
        );
    }

    #[test]
    fn test_conversion_classes() {
        let err: TasklyError = BillingError::ProposalAlreadyBilled {
            proposal_id: "p1".to_string(),
        }
        .into();
        assert!(matches!(err, TasklyError::Conflict(_)));

        let err: TasklyError = BillingError::PlanNotFound {
            plan_id: "team".to_string(),
        }
        .into();
        assert!(matches!(err, TasklyError::NotFound(_)));

        let err: TasklyError = BillingError::GatewayTimeout {
            operation: "create_session".to_string(),
        }
        .into();
        assert!(matches!(err, TasklyError::RequestTimeout));
    }

    #[test]
    fn test_retryable() {
        assert!(BillingError::GatewayFailed {
            operation: "create_session".to_string(),
            message: "503".to_string(),
        }
        .is_retryable());
        assert!(!BillingError::InvalidSignature.is_retryable());
    }
}
