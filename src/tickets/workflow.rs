//! The ticket/proposal workflow and billing issuance.
//!
//! Approval publishes `ProposalApproved`; [`BillingIssuanceHandler`]
//! consumes it, issues the add-on invoice, and links it back to the
//! proposal. A recovery sweep over approved-but-unbilled proposals covers
//! handler failures, so the event path never silently drops billing.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::proposal::{NewProposal, TicketProposal};
use super::storage::TicketStore;
use super::ticket::{generate_ticket_code, NewTicket, Ticket, TicketStatus, TicketStatusChange};
use crate::auth::{AuthContext, Capability};
use crate::billing::gateway::PaymentGateway;
use crate::billing::storage::BillingStore;
use crate::billing::audit::BillingAuditLogger;
use crate::billing::BillingManager;
use crate::catalog::CatalogStore;
use crate::error::{Result, TasklyError};
use crate::events::{DomainEvent, EventBus, EventHandler};
use crate::ids::{ProposalId, TicketId};

/// Attempts at allocating a unique ticket code before giving up.
const MAX_CODE_ATTEMPTS: u32 = 5;

/// Manager for tickets and the proposal state machine.
pub struct ProposalWorkflow<TS, CS> {
    tickets: TS,
    catalog: CS,
    events: EventBus,
}

impl<TS: Clone, CS: Clone> Clone for ProposalWorkflow<TS, CS> {
    fn clone(&self) -> Self {
        Self {
            tickets: self.tickets.clone(),
            catalog: self.catalog.clone(),
            events: self.events.clone(),
        }
    }
}

impl<TS: TicketStore, CS: CatalogStore> ProposalWorkflow<TS, CS> {
    #[must_use]
    pub fn new(tickets: TS, catalog: CS, events: EventBus) -> Self {
        Self {
            tickets,
            catalog,
            events,
        }
    }

    /// Open a ticket. The code is allocated with a bounded retry loop
    /// against the store's uniqueness guarantee.
    pub async fn open_ticket(&self, ctx: &AuthContext, params: NewTicket) -> Result<Ticket> {
        ctx.require_company(&params.company_id)?;

        if params.subject.trim().is_empty() {
            return Err(TasklyError::validation("subject", "must not be empty"));
        }

        let now = Utc::now();
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let ticket = Ticket {
                id: TicketId::new(),
                code: generate_ticket_code(now),
                company_id: params.company_id.clone(),
                kind: params.kind,
                priority: params.priority,
                status: TicketStatus::Open,
                subject: params.subject.clone(),
                created_by: params.created_by.clone(),
                assigned_to: None,
                resolved_at: None,
                closed_at: None,
                created_at: now,
                updated_at: now,
            };

            match self.tickets.insert_ticket(&ticket).await {
                Ok(()) => {
                    tracing::info!(
                        ticket_id = %ticket.id,
                        code = %ticket.code,
                        kind = %ticket.kind,
                        "ticket opened"
                    );
                    return Ok(ticket);
                }
                Err(TasklyError::Conflict(_)) => {
                    tracing::debug!(attempt, "ticket code collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(TasklyError::internal(format!(
            "could not allocate a unique ticket code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Move a ticket to a new status, appending to the audit trail.
    pub async fn change_ticket_status(
        &self,
        ctx: &AuthContext,
        ticket_id: &TicketId,
        to_status: TicketStatus,
        note: Option<String>,
    ) -> Result<Ticket> {
        let mut ticket = self
            .tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("ticket {}", ticket_id)))?;

        if ticket.status == to_status {
            return Err(TasklyError::bad_request(format!(
                "ticket is already {}",
                to_status
            )));
        }

        let now = Utc::now();
        let change = TicketStatusChange {
            ticket_id: ticket.id.clone(),
            from_status: ticket.status,
            to_status,
            changed_by: ctx.user_id.clone(),
            note,
            changed_at: now,
        };

        ticket.status = to_status;
        ticket.updated_at = now;
        match to_status {
            TicketStatus::Resolved => ticket.resolved_at = Some(now),
            TicketStatus::Closed => ticket.closed_at = Some(now),
            _ => {}
        }

        self.tickets.update_ticket(&ticket).await?;
        self.tickets.append_status_change(&change).await?;

        tracing::debug!(
            ticket_id = %ticket_id,
            from = %change.from_status,
            to = %to_status,
            "ticket status changed"
        );

        Ok(ticket)
    }

    /// Submit a priced proposal for a feature-request ticket.
    ///
    /// Requires the `SubmitProposal` capability. The ticket must be a
    /// feature request with no prior proposal, and the module must be an
    /// active add-on.
    pub async fn submit_proposal(
        &self,
        ctx: &AuthContext,
        params: NewProposal,
    ) -> Result<TicketProposal> {
        ctx.require(Capability::SubmitProposal)?;

        if params.estimated_price <= 0 {
            return Err(TasklyError::validation(
                "estimated_price",
                "must be greater than zero",
            ));
        }
        if params.estimated_days == 0 {
            return Err(TasklyError::validation(
                "estimated_days",
                "must be at least one day",
            ));
        }

        let ticket = self
            .tickets
            .get_ticket(&params.ticket_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("ticket {}", params.ticket_id)))?;

        if ticket.kind != super::ticket::TicketKind::Feature {
            return Err(TasklyError::bad_request(
                "only feature-request tickets can receive a proposal",
            ));
        }

        let module = self
            .catalog
            .get_module(&params.module_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("module {}", params.module_id)))?;
        if !module.is_billable_addon() {
            return Err(crate::billing::BillingError::ModuleNotBillable {
                module_id: module.id.to_string(),
            }
            .into());
        }

        let proposal = TicketProposal::new(params, Utc::now());
        self.tickets.insert_proposal(&proposal).await?;

        tracing::info!(
            proposal_id = %proposal.id,
            ticket_id = %proposal.ticket_id,
            module_id = %proposal.module_id,
            estimated_price = proposal.estimated_price,
            "proposal submitted"
        );

        Ok(proposal)
    }

    /// Approve a pending proposal on behalf of the company.
    ///
    /// One-way. Publishes `ProposalApproved` for the billing-issuance
    /// handler.
    pub async fn approve_proposal(
        &self,
        ctx: &AuthContext,
        proposal_id: &ProposalId,
    ) -> Result<TicketProposal> {
        ctx.require(Capability::DecideProposal)?;

        let mut proposal = self
            .tickets
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("proposal {}", proposal_id)))?;

        let ticket = self
            .tickets
            .get_ticket(&proposal.ticket_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("ticket {}", proposal.ticket_id)))?;
        ctx.require_company(&ticket.company_id)?;

        proposal.approve(Utc::now())?;
        self.tickets.update_proposal(&proposal).await?;

        tracing::info!(
            proposal_id = %proposal.id,
            company_id = %ticket.company_id,
            "proposal approved"
        );

        self.events
            .publish(DomainEvent::ProposalApproved {
                proposal_id: proposal.id.clone(),
                ticket_id: ticket.id.clone(),
                company_id: ticket.company_id.clone(),
                module_id: proposal.module_id.clone(),
                amount: proposal.estimated_price,
            })
            .await;

        Ok(proposal)
    }

    /// Reject a pending proposal. Terminal; no invoice is ever generated.
    pub async fn reject_proposal(
        &self,
        ctx: &AuthContext,
        proposal_id: &ProposalId,
    ) -> Result<TicketProposal> {
        ctx.require(Capability::DecideProposal)?;

        let mut proposal = self
            .tickets
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("proposal {}", proposal_id)))?;

        let ticket = self
            .tickets
            .get_ticket(&proposal.ticket_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("ticket {}", proposal.ticket_id)))?;
        ctx.require_company(&ticket.company_id)?;

        proposal.reject(Utc::now())?;
        self.tickets.update_proposal(&proposal).await?;

        tracing::info!(proposal_id = %proposal.id, "proposal rejected");

        Ok(proposal)
    }

    /// The proposal attached to a ticket, if any.
    pub async fn proposal_for_ticket(&self, ticket_id: &TicketId) -> Result<Option<TicketProposal>> {
        self.tickets.get_proposal_by_ticket(ticket_id).await
    }

    /// The ticket's append-only status trail.
    pub async fn ticket_history(&self, ticket_id: &TicketId) -> Result<Vec<TicketStatusChange>> {
        self.tickets.status_history(ticket_id).await
    }
}

/// Consumes `ProposalApproved` events and issues add-on invoices.
pub struct BillingIssuanceHandler<TS, BS, G, A> {
    tickets: TS,
    billing: Arc<BillingManager<BS, G, A>>,
}

impl<TS, BS, G, A> BillingIssuanceHandler<TS, BS, G, A>
where
    TS: TicketStore,
    BS: BillingStore,
    G: PaymentGateway,
    A: BillingAuditLogger,
{
    #[must_use]
    pub fn new(tickets: TS, billing: Arc<BillingManager<BS, G, A>>) -> Self {
        Self { tickets, billing }
    }

    /// Issue the invoice for one approved proposal and link it.
    async fn bill_proposal(&self, proposal_id: &ProposalId) -> Result<()> {
        let mut proposal = self
            .tickets
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("proposal {}", proposal_id)))?;

        if !proposal.is_unbilled() {
            tracing::debug!(proposal_id = %proposal_id, "proposal is not awaiting billing");
            return Ok(());
        }

        let ticket = self
            .tickets
            .get_ticket(&proposal.ticket_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("ticket {}", proposal.ticket_id)))?;

        let invoice = self
            .billing
            .issue_addon_invoice(
                &ticket.company_id,
                &proposal.module_id,
                &proposal.id,
                format!("{} ({})", ticket.subject, ticket.code),
                proposal.estimated_price,
            )
            .await?;

        proposal.mark_billed(invoice.id.clone(), Utc::now())?;
        self.tickets.update_proposal(&proposal).await?;

        tracing::info!(
            proposal_id = %proposal.id,
            invoice_number = %invoice.number,
            "proposal billed"
        );

        Ok(())
    }

    /// Recovery sweep: bill every approved proposal that has no invoice.
    ///
    /// Returns the number of proposals billed.
    pub async fn sweep_unbilled(&self) -> Result<usize> {
        let unbilled = self.tickets.unbilled_proposals().await?;
        let mut billed = 0;
        for proposal in &unbilled {
            self.bill_proposal(&proposal.id).await?;
            billed += 1;
        }
        if billed > 0 {
            tracing::info!(billed, "recovery sweep billed missed proposals");
        }
        Ok(billed)
    }
}

#[async_trait]
impl<TS, BS, G, A> EventHandler for BillingIssuanceHandler<TS, BS, G, A>
where
    TS: TicketStore,
    BS: BillingStore,
    G: PaymentGateway,
    A: BillingAuditLogger,
{
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        if let DomainEvent::ProposalApproved { proposal_id, .. } = event {
            self.bill_proposal(proposal_id).await?;
        }
        Ok(())
    }
}
