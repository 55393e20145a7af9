//! Storage trait for tickets and proposals.

use async_trait::async_trait;

use super::proposal::TicketProposal;
use super::ticket::{Ticket, TicketStatusChange};
use crate::error::Result;
use crate::ids::{CompanyId, ProposalId, TicketId};

/// Trait for storing tickets, their status trail, and proposals.
#[async_trait]
pub trait TicketStore: Send + Sync {
    // Tickets

    /// Insert a new ticket. Fails with a conflict if the code is taken.
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// Update an existing ticket.
    async fn update_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// Get a ticket by ID.
    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>>;

    /// Get a ticket by its human-facing code.
    async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>>;

    /// List all tickets for a company, newest first.
    async fn tickets_for_company(&self, company_id: &CompanyId) -> Result<Vec<Ticket>>;

    // Status history (append-only)

    /// Append a status change to the ticket's trail.
    async fn append_status_change(&self, change: &TicketStatusChange) -> Result<()>;

    /// The ticket's status trail, oldest first.
    async fn status_history(&self, ticket_id: &TicketId) -> Result<Vec<TicketStatusChange>>;

    // Proposals

    /// Insert a new proposal. Fails with a conflict if the ticket already
    /// has one.
    async fn insert_proposal(&self, proposal: &TicketProposal) -> Result<()>;

    /// Update an existing proposal.
    async fn update_proposal(&self, proposal: &TicketProposal) -> Result<()>;

    /// Get a proposal by ID.
    async fn get_proposal(&self, id: &ProposalId) -> Result<Option<TicketProposal>>;

    /// Get the proposal attached to a ticket, if any.
    async fn get_proposal_by_ticket(&self, ticket_id: &TicketId) -> Result<Option<TicketProposal>>;

    /// Approved proposals with no invoice yet. Used only as a recovery
    /// sweep for missed `ProposalApproved` events.
    async fn unbilled_proposals(&self) -> Result<Vec<TicketProposal>>;
}

/// In-memory ticket store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use crate::error::TasklyError;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory ticket store.
    #[derive(Default, Clone)]
    pub struct InMemoryTicketStore {
        inner: Arc<InMemoryTicketStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryTicketStoreInner {
        tickets: RwLock<HashMap<TicketId, Ticket>>,
        history: RwLock<Vec<TicketStatusChange>>,
        proposals: RwLock<HashMap<ProposalId, TicketProposal>>,
    }

    impl InMemoryTicketStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl TicketStore for InMemoryTicketStore {
        async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
            let mut tickets = self.inner.tickets.write().unwrap();
            if tickets.values().any(|t| t.code == ticket.code) {
                return Err(TasklyError::conflict(format!(
                    "ticket code '{}' already exists",
                    ticket.code
                )));
            }
            tickets.insert(ticket.id.clone(), ticket.clone());
            Ok(())
        }

        async fn update_ticket(&self, ticket: &Ticket) -> Result<()> {
            let mut tickets = self.inner.tickets.write().unwrap();
            if !tickets.contains_key(&ticket.id) {
                return Err(TasklyError::not_found(format!("ticket {}", ticket.id)));
            }
            tickets.insert(ticket.id.clone(), ticket.clone());
            Ok(())
        }

        async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
            Ok(self.inner.tickets.read().unwrap().get(id).cloned())
        }

        async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>> {
            Ok(self
                .inner
                .tickets
                .read()
                .unwrap()
                .values()
                .find(|t| t.code == code)
                .cloned())
        }

        async fn tickets_for_company(&self, company_id: &CompanyId) -> Result<Vec<Ticket>> {
            let mut result: Vec<Ticket> = self
                .inner
                .tickets
                .read()
                .unwrap()
                .values()
                .filter(|t| &t.company_id == company_id)
                .cloned()
                .collect();
            result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(result)
        }

        async fn append_status_change(&self, change: &TicketStatusChange) -> Result<()> {
            self.inner.history.write().unwrap().push(change.clone());
            Ok(())
        }

        async fn status_history(&self, ticket_id: &TicketId) -> Result<Vec<TicketStatusChange>> {
            Ok(self
                .inner
                .history
                .read()
                .unwrap()
                .iter()
                .filter(|c| &c.ticket_id == ticket_id)
                .cloned()
                .collect())
        }

        async fn insert_proposal(&self, proposal: &TicketProposal) -> Result<()> {
            let mut proposals = self.inner.proposals.write().unwrap();
            // A ticket has at most one proposal.
            if proposals
                .values()
                .any(|p| p.ticket_id == proposal.ticket_id)
            {
                return Err(TasklyError::conflict(format!(
                    "ticket {} already has a proposal",
                    proposal.ticket_id
                )));
            }
            proposals.insert(proposal.id.clone(), proposal.clone());
            Ok(())
        }

        async fn update_proposal(&self, proposal: &TicketProposal) -> Result<()> {
            let mut proposals = self.inner.proposals.write().unwrap();
            if !proposals.contains_key(&proposal.id) {
                return Err(TasklyError::not_found(format!("proposal {}", proposal.id)));
            }
            proposals.insert(proposal.id.clone(), proposal.clone());
            Ok(())
        }

        async fn get_proposal(&self, id: &ProposalId) -> Result<Option<TicketProposal>> {
            Ok(self.inner.proposals.read().unwrap().get(id).cloned())
        }

        async fn get_proposal_by_ticket(
            &self,
            ticket_id: &TicketId,
        ) -> Result<Option<TicketProposal>> {
            Ok(self
                .inner
                .proposals
                .read()
                .unwrap()
                .values()
                .find(|p| &p.ticket_id == ticket_id)
                .cloned())
        }

        async fn unbilled_proposals(&self) -> Result<Vec<TicketProposal>> {
            Ok(self
                .inner
                .proposals
                .read()
                .unwrap()
                .values()
                .filter(|p| p.is_unbilled())
                .cloned()
                .collect())
        }
    }
}
