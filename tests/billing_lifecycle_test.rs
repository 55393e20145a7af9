//! End-to-end tests for the commercial lifecycle: plan purchase, the
//! ticket/proposal/add-on path, webhook settlement, and the subscription
//! invariants.

use std::sync::Arc;

use chrono::{Duration, Utc};
use taskly_billing::billing::{
    BillingManager, BillingStore, InMemoryBillingStore, InvoiceStatus, MockPaymentGateway,
    WebhookHandler, WebhookOutcome,
};
use taskly_billing::catalog::{
    BillingCycle, CatalogManager, InMemoryCatalogStore, ModuleKind, ModuleScope, NewModule,
    NewPlan,
};
use taskly_billing::events::EventBus;
use taskly_billing::ids::{CompanyId, UserId};
use taskly_billing::tickets::{
    BillingIssuanceHandler, InMemoryTicketStore, NewProposal, NewTicket, ProposalStatus,
    ProposalWorkflow, TicketKind, TicketPriority, TicketStore,
};
use taskly_billing::{
    AuthContext, ConfigBuilder, PaymentNotification, PaymentStatus, Role, SubscriptionStatus,
};

struct World {
    billing_store: InMemoryBillingStore,
    ticket_store: InMemoryTicketStore,
    catalog: CatalogManager<InMemoryCatalogStore>,
    billing: Arc<BillingManager<InMemoryBillingStore, MockPaymentGateway>>,
    webhooks: WebhookHandler<InMemoryBillingStore>,
    workflow: ProposalWorkflow<InMemoryTicketStore, InMemoryCatalogStore>,
    company: CompanyId,
}

fn world() -> World {
    let config = ConfigBuilder::new()
        .with_webhook_secret("whsec_test")
        .with_gateway_timeout_seconds(2)
        .build()
        .unwrap();

    let billing_store = InMemoryBillingStore::new();
    let ticket_store = InMemoryTicketStore::new();
    let catalog_store = InMemoryCatalogStore::new();

    let billing = Arc::new(BillingManager::new(
        billing_store.clone(),
        Arc::new(MockPaymentGateway::new()),
        config.clone(),
    ));

    let mut events = EventBus::new();
    events.subscribe(Arc::new(BillingIssuanceHandler::new(
        ticket_store.clone(),
        billing.clone(),
    )));

    World {
        webhooks: WebhookHandler::new(billing_store.clone(), config, EventBus::new()),
        workflow: ProposalWorkflow::new(ticket_store.clone(), catalog_store.clone(), events),
        catalog: CatalogManager::new(catalog_store),
        billing_store,
        ticket_store,
        billing,
        company: CompanyId::new(),
    }
}

fn platform_admin() -> AuthContext {
    AuthContext::new(UserId::new(), vec![Role::Admin])
}

fn company_owner(company: &CompanyId) -> AuthContext {
    AuthContext::new(UserId::new(), vec![Role::Owner]).for_company(company.clone())
}

fn success_webhook(event_id: &str, reference: &str) -> PaymentNotification {
    PaymentNotification {
        event_id: event_id.to_string(),
        reference: reference.to_string(),
        status: PaymentStatus::Success,
        payment_method: Some("bank_transfer".to_string()),
        transaction_id: Some(format!("trx-{}", event_id)),
    }
}

/// Plan purchase: issue an invoice and check the payability window.
#[tokio::test]
async fn plan_invoice_payability_window() {
    let w = world();
    let ctx = company_owner(&w.company);

    let plan = w
        .catalog
        .create_plan(
            &platform_admin(),
            NewPlan {
                name: "Team".to_string(),
                price_monthly: 100_000,
                price_yearly: None,
                is_basic: false,
            },
        )
        .await
        .unwrap();

    let invoice = w
        .billing
        .issue_plan_invoice(&ctx, &w.company, &plan, BillingCycle::Monthly)
        .await
        .unwrap();

    assert_eq!(invoice.plan.amount, 100_000);
    let now = Utc::now();
    assert!(invoice.is_payable(now));
    // The default due window is 24 hours; one hour past it the invoice is
    // no longer payable.
    assert!(!invoice.is_payable(now + Duration::hours(25)));
    assert!(invoice.is_overdue(now + Duration::hours(25)));
}

/// The feature-request commercial path: proposal submitted, approved, and
/// billed into exactly one add-on invoice.
#[tokio::test]
async fn proposal_approval_bills_exactly_once() {
    let w = world();
    let admin = platform_admin();
    let owner = company_owner(&w.company);

    let module = w
        .catalog
        .create_module(
            &admin,
            NewModule {
                name: "Time Tracking".to_string(),
                kind: ModuleKind::Addon,
                scope: ModuleScope::Company,
                price: 500_000,
            },
        )
        .await
        .unwrap();

    let ticket = w
        .workflow
        .open_ticket(
            &owner,
            NewTicket {
                company_id: w.company.clone(),
                kind: TicketKind::Feature,
                priority: TicketPriority::High,
                subject: "Add time tracking".to_string(),
                created_by: owner.user_id.clone(),
            },
        )
        .await
        .unwrap();

    let proposal = w
        .workflow
        .submit_proposal(
            &admin,
            NewProposal {
                ticket_id: ticket.id.clone(),
                module_id: module.id.clone(),
                estimated_price: 500_000,
                estimated_days: 14,
                submitted_by: admin.user_id.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(proposal.status, ProposalStatus::Pending);

    w.workflow.approve_proposal(&owner, &proposal.id).await.unwrap();

    let billed = w
        .ticket_store
        .get_proposal(&proposal.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(billed.status, ProposalStatus::Billed);
    assert!(billed.approved_at.is_some());

    let invoice = w
        .billing_store
        .get_add_on_invoice_by_proposal(&proposal.id)
        .await
        .unwrap()
        .expect("exactly one add-on invoice");
    assert_eq!(invoice.amount, 500_000);
    assert_eq!(invoice.status, InvoiceStatus::Unpaid);
    assert_eq!(invoice.module_id, module.id);

    // A later recovery sweep has nothing left to do.
    let handler = BillingIssuanceHandler::new(w.ticket_store.clone(), w.billing.clone());
    assert_eq!(handler.sweep_unbilled().await.unwrap(), 0);
}

/// Webhook settlement of an add-on invoice activates the company add-on;
/// redelivering the identical webhook changes nothing.
#[tokio::test]
async fn addon_payment_and_webhook_replay() {
    let w = world();
    let admin = platform_admin();
    let owner = company_owner(&w.company);

    let module = w
        .catalog
        .create_module(
            &admin,
            NewModule {
                name: "Client Portal".to_string(),
                kind: ModuleKind::Addon,
                scope: ModuleScope::Company,
                price: 750_000,
            },
        )
        .await
        .unwrap();

    let ticket = w
        .workflow
        .open_ticket(
            &owner,
            NewTicket {
                company_id: w.company.clone(),
                kind: TicketKind::Feature,
                priority: TicketPriority::Medium,
                subject: "Client portal access".to_string(),
                created_by: owner.user_id.clone(),
            },
        )
        .await
        .unwrap();

    let proposal = w
        .workflow
        .submit_proposal(
            &admin,
            NewProposal {
                ticket_id: ticket.id,
                module_id: module.id.clone(),
                estimated_price: 750_000,
                estimated_days: 21,
                submitted_by: admin.user_id.clone(),
            },
        )
        .await
        .unwrap();
    w.workflow.approve_proposal(&owner, &proposal.id).await.unwrap();

    let invoice = w
        .billing_store
        .get_add_on_invoice_by_proposal(&proposal.id)
        .await
        .unwrap()
        .unwrap();

    // Start the payment so the invoice carries a session token.
    let session = w.billing.start_addon_payment(&owner, &invoice.id).await.unwrap();
    assert!(!session.token.is_empty());

    // Gateway confirms the payment.
    let notification = success_webhook("evt_addon", &invoice.number);
    let outcome = w.webhooks.handle_notification(notification.clone()).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let addon = w
        .billing_store
        .get_company_addon(&w.company, &module.id)
        .await
        .unwrap()
        .expect("company add-on activated");
    assert!(addon.is_currently_active(Utc::now()));

    let paid = w
        .billing_store
        .get_add_on_invoice(&invoice.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    let first_paid_at = paid.paid_at;

    // The gateway redelivers the identical webhook.
    let outcome = w.webhooks.handle_notification(notification).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);

    let addons = w.billing_store.list_company_addons(&w.company).await.unwrap();
    assert_eq!(addons.len(), 1, "no second activation row");

    let still_paid = w
        .billing_store
        .get_add_on_invoice(&invoice.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_paid.paid_at, first_paid_at);
}

/// Any sequence of plan purchases leaves at most one active subscription.
#[tokio::test]
async fn one_active_subscription_per_company() {
    let w = world();
    let admin = platform_admin();
    let owner = company_owner(&w.company);

    let team = w
        .catalog
        .create_plan(
            &admin,
            NewPlan {
                name: "Team".to_string(),
                price_monthly: 150_000,
                price_yearly: Some(1_500_000),
                is_basic: false,
            },
        )
        .await
        .unwrap();
    let business = w
        .catalog
        .create_plan(
            &admin,
            NewPlan {
                name: "Business".to_string(),
                price_monthly: 400_000,
                price_yearly: Some(4_000_000),
                is_basic: false,
            },
        )
        .await
        .unwrap();

    // Buy Team monthly, then renew it, then upgrade to Business yearly.
    for (plan, cycle, event) in [
        (&team, BillingCycle::Monthly, "evt_1"),
        (&team, BillingCycle::Monthly, "evt_2"),
        (&business, BillingCycle::Yearly, "evt_3"),
    ] {
        let invoice = w
            .billing
            .issue_plan_invoice(&owner, &w.company, plan, cycle)
            .await
            .unwrap();
        w.webhooks
            .handle_notification(success_webhook(event, &invoice.number))
            .await
            .unwrap();
    }

    let all = w.billing_store.all_subscriptions_for(&w.company);
    let active: Vec<_> = all
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .collect();
    assert_eq!(active.len(), 1, "exactly one active subscription");
    assert_eq!(active[0].plan_id, business.id);
    assert_eq!(active[0].billing_cycle, BillingCycle::Yearly);

    // The same-plan renewal extended in place, so two rows exist in total:
    // the extended Team subscription (now replaced) and the Business one.
    assert_eq!(all.len(), 2);
    assert!(w
        .billing
        .active_subscription(&w.company)
        .await
        .unwrap()
        .is_some());
}

/// A renewal close to expiry shows up in the reminder window before and
/// not after.
#[tokio::test]
async fn expiring_soon_drives_reminders() {
    let w = world();
    let admin = platform_admin();
    let owner = company_owner(&w.company);

    let plan = w
        .catalog
        .create_plan(
            &admin,
            NewPlan {
                name: "Team".to_string(),
                price_monthly: 150_000,
                price_yearly: None,
                is_basic: false,
            },
        )
        .await
        .unwrap();

    let invoice = w
        .billing
        .issue_plan_invoice(&owner, &w.company, &plan, BillingCycle::Monthly)
        .await
        .unwrap();
    w.webhooks
        .handle_notification(success_webhook("evt_sub", &invoice.number))
        .await
        .unwrap();

    let subscription = w
        .billing
        .active_subscription(&w.company)
        .await
        .unwrap()
        .unwrap();

    // Fresh 30-day subscription: not in the 3-day reminder window yet.
    let soon = w
        .billing_store
        .subscriptions_expiring_soon(Utc::now(), 3)
        .await
        .unwrap();
    assert!(soon.is_empty());

    // Two days before the end it is.
    let near_expiry = subscription.ends_at - Duration::days(2);
    let soon = w
        .billing_store
        .subscriptions_expiring_soon(near_expiry, 3)
        .await
        .unwrap();
    assert_eq!(soon.len(), 1);
    assert_eq!(soon[0].id, subscription.id);
}
