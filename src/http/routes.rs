//! Route assembly and handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::billing::audit::BillingAuditLogger;
use crate::billing::gateway::PaymentGateway;
use crate::billing::storage::BillingStore;
use crate::billing::{BillingManager, Invoice, SignatureVerifier, WebhookHandler};
use crate::catalog::CatalogStore;
use crate::error::{Result, TasklyError};
use crate::ids::{InvoiceAddOnId, InvoiceId, ProposalId};
use crate::tickets::storage::TicketStore;
use crate::tickets::{ProposalWorkflow, TicketProposal};

/// Shared state for the billing routes.
pub struct AppState<BS, G, TS, CS, A> {
    pub billing: Arc<BillingManager<BS, G, A>>,
    pub webhooks: Arc<WebhookHandler<BS, A>>,
    pub workflow: Arc<ProposalWorkflow<TS, CS>>,
    pub verifier: Arc<SignatureVerifier>,
}

impl<BS, G, TS, CS, A> Clone for AppState<BS, G, TS, CS, A> {
    fn clone(&self) -> Self {
        Self {
            billing: self.billing.clone(),
            webhooks: self.webhooks.clone(),
            workflow: self.workflow.clone(),
            verifier: self.verifier.clone(),
        }
    }
}

/// Build the billing core's router.
pub fn router<BS, G, TS, CS, A>(state: AppState<BS, G, TS, CS, A>) -> Router
where
    BS: BillingStore + 'static,
    G: PaymentGateway + 'static,
    TS: TicketStore + 'static,
    CS: CatalogStore + 'static,
    A: BillingAuditLogger + 'static,
{
    Router::new()
        .route("/webhooks/payment", post(payment_webhook))
        .route("/billing/invoices/by-number/{number}", get(get_invoice))
        .route("/billing/invoices/{id}/pay", post(pay_invoice))
        .route("/billing/add-on-invoices/{id}/pay", post(pay_addon_invoice))
        .route("/proposals/{id}/approve", post(approve_proposal))
        .route("/proposals/{id}/reject", post(reject_proposal))
        .with_state(state)
}

#[derive(Serialize)]
struct WebhookResponse {
    outcome: &'static str,
}

/// Gateway payment callback intake.
///
/// Verifies the signature before anything else; replays settle as no-ops
/// inside the handler.
async fn payment_webhook<BS, G, TS, CS, A>(
    State(state): State<AppState<BS, G, TS, CS, A>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<WebhookResponse>>
where
    BS: BillingStore,
    G: PaymentGateway,
    TS: TicketStore,
    CS: CatalogStore,
    A: BillingAuditLogger,
{
    let signature = headers
        .get("x-gateway-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TasklyError::bad_request("missing X-Gateway-Signature header"))?;

    let notification = state.verifier.verify(&body, signature, Utc::now())?;
    let outcome = state.webhooks.handle_notification(notification).await?;

    Ok(Json(WebhookResponse {
        outcome: outcome.as_str(),
    }))
}

async fn get_invoice<BS, G, TS, CS, A>(
    State(state): State<AppState<BS, G, TS, CS, A>>,
    ctx: AuthContext,
    Path(number): Path<String>,
) -> Result<Json<Invoice>>
where
    BS: BillingStore,
    G: PaymentGateway,
    TS: TicketStore,
    CS: CatalogStore,
    A: BillingAuditLogger,
{
    let invoice = state.billing.invoice_by_number(&number).await?;
    ctx.require_company(&invoice.company_id)?;
    Ok(Json(invoice))
}

#[derive(Serialize)]
struct PaymentSessionResponse {
    token: String,
    redirect_url: String,
}

async fn pay_invoice<BS, G, TS, CS, A>(
    State(state): State<AppState<BS, G, TS, CS, A>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentSessionResponse>>
where
    BS: BillingStore,
    G: PaymentGateway,
    TS: TicketStore,
    CS: CatalogStore,
    A: BillingAuditLogger,
{
    let session = state
        .billing
        .start_invoice_payment(&ctx, &InvoiceId(id))
        .await?;
    Ok(Json(PaymentSessionResponse {
        token: session.token,
        redirect_url: session.redirect_url,
    }))
}

async fn pay_addon_invoice<BS, G, TS, CS, A>(
    State(state): State<AppState<BS, G, TS, CS, A>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentSessionResponse>>
where
    BS: BillingStore,
    G: PaymentGateway,
    TS: TicketStore,
    CS: CatalogStore,
    A: BillingAuditLogger,
{
    let session = state
        .billing
        .start_addon_payment(&ctx, &InvoiceAddOnId(id))
        .await?;
    Ok(Json(PaymentSessionResponse {
        token: session.token,
        redirect_url: session.redirect_url,
    }))
}

async fn approve_proposal<BS, G, TS, CS, A>(
    State(state): State<AppState<BS, G, TS, CS, A>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketProposal>>
where
    BS: BillingStore,
    G: PaymentGateway,
    TS: TicketStore,
    CS: CatalogStore,
    A: BillingAuditLogger,
{
    let proposal = state
        .workflow
        .approve_proposal(&ctx, &ProposalId(id))
        .await?;
    Ok(Json(proposal))
}

async fn reject_proposal<BS, G, TS, CS, A>(
    State(state): State<AppState<BS, G, TS, CS, A>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketProposal>>
where
    BS: BillingStore,
    G: PaymentGateway,
    TS: TicketStore,
    CS: CatalogStore,
    A: BillingAuditLogger,
{
    let proposal = state
        .workflow
        .reject_proposal(&ctx, &ProposalId(id))
        .await?;
    Ok(Json(proposal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::audit::TracingAuditLogger;
    use crate::billing::gateway::test::MockPaymentGateway;
    use crate::billing::storage::test::InMemoryBillingStore;
    use crate::billing::webhook::compute_signature;
    use crate::catalog::storage::test::InMemoryCatalogStore;
    use crate::config::{Config, ConfigBuilder};
    use crate::events::EventBus;
    use crate::ids::CompanyId;
    use crate::tickets::storage::test::InMemoryTicketStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn config() -> Config {
        ConfigBuilder::new()
            .with_webhook_secret("whsec_test")
            .build()
            .unwrap()
    }

    fn test_app(
        store: InMemoryBillingStore,
    ) -> Router {
        let config = config();
        let billing = Arc::new(BillingManager::new(
            store.clone(),
            Arc::new(MockPaymentGateway::new()),
            config.clone(),
        ));
        let webhooks = Arc::new(WebhookHandler::new(
            store,
            config.clone(),
            EventBus::new(),
        ));
        let workflow = Arc::new(ProposalWorkflow::new(
            InMemoryTicketStore::new(),
            InMemoryCatalogStore::new(),
            EventBus::new(),
        ));

        let state: AppState<
            InMemoryBillingStore,
            MockPaymentGateway,
            InMemoryTicketStore,
            InMemoryCatalogStore,
            TracingAuditLogger,
        > = AppState {
            billing,
            webhooks,
            workflow,
            verifier: Arc::new(SignatureVerifier::new("whsec_test".to_string())),
        };
        router(state)
    }

    fn signed_header(payload: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let signed_payload = format!("{}.{}", timestamp, payload);
        let sig = compute_signature("whsec_test", signed_payload.as_bytes()).unwrap();
        format!("t={},v1={}", timestamp, sig)
    }

    #[tokio::test]
    async fn test_webhook_rejects_missing_signature() {
        let app = test_app(InMemoryBillingStore::new());

        let response = app
            .oneshot(
                Request::post("/webhooks/payment")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_accepts_signed_notification() {
        let app = test_app(InMemoryBillingStore::new());

        let payload = serde_json::json!({
            "event_id": "evt_http_1",
            "reference": "INV/20260807/NOONE",
            "status": "success",
            "payment_method": "bank_transfer",
            "transaction_id": "trx-1",
        })
        .to_string();

        let response = app
            .oneshot(
                Request::post("/webhooks/payment")
                    .header("content-type", "application/json")
                    .header("x-gateway-signature", signed_header(&payload))
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();

        // Unknown invoice: verified fine, settles as ignored.
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invoice_lookup_requires_identity() {
        let app = test_app(InMemoryBillingStore::new());

        let response = app
            .oneshot(
                Request::get("/billing/invoices/by-number/INV%2F20260807%2FAAAAA")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_foreign_company_cannot_read_invoice() {
        use crate::billing::invoice::{InvoiceStatus, PlanSnapshot};
        use crate::catalog::BillingCycle;
        use crate::ids::{InvoiceId, PlanId};
        use chrono::Duration;

        let store = InMemoryBillingStore::new();
        let company = CompanyId::new();
        let now = Utc::now();
        store
            .insert_invoice(&Invoice {
                id: InvoiceId::new(),
                number: "INV/20260807/HTTP1".to_string(),
                company_id: company,
                plan: PlanSnapshot {
                    plan_id: PlanId::new(),
                    plan_name: "Team".to_string(),
                    amount: 100_000,
                    duration_days: 30,
                    cycle: BillingCycle::Monthly,
                },
                status: InvoiceStatus::Unpaid,
                snap_token: None,
                payment_reference: None,
                payment_method: None,
                issued_at: now,
                due_date: now + Duration::days(1),
                paid_at: None,
            })
            .await
            .unwrap();

        let app = test_app(store);
        let response = app
            .oneshot(
                Request::get("/billing/invoices/by-number/INV%2F20260807%2FHTTP1")
                    .header("x-user-id", Uuid::new_v4().to_string())
                    .header("x-roles", "owner")
                    .header("x-company-id", Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
