//! Authorization context for billing operations.
//!
//! State-changing operations take an explicit [`AuthContext`] instead of
//! reading roles off a user model. Capability checks run before any write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TasklyError};
use crate::ids::{CompanyId, UserId, WorkspaceId};

/// Role held by the acting user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform administrator (support staff).
    Admin,
    /// Company owner with billing permissions.
    Owner,
    /// Regular company member.
    #[default]
    Member,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing a role string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError {
    invalid_value: String,
}

impl fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid role: '{}' (expected: admin, owner, or member)",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            _ => Err(ParseRoleError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// Capabilities gating billing operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Create a proposal for a feature-request ticket (platform admin).
    SubmitProposal,
    /// Approve or reject a proposal (company side).
    DecideProposal,
    /// Manage the permission/module/plan catalog (platform admin).
    ManageCatalog,
    /// Issue invoices, start payments, manage subscriptions (company side).
    ManageBilling,
}

impl Capability {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmitProposal => "submit_proposal",
            Self::DecideProposal => "decide_proposal",
            Self::ManageCatalog => "manage_catalog",
            Self::ManageBilling => "manage_billing",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The caller's identity and scope, passed into every state-changing
/// operation.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub company_id: Option<CompanyId>,
    pub workspace_id: Option<WorkspaceId>,
}

impl AuthContext {
    #[must_use]
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            roles,
            company_id: None,
            workspace_id: None,
        }
    }

    #[must_use]
    pub fn for_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    #[must_use]
    pub fn for_workspace(mut self, workspace_id: WorkspaceId) -> Self {
        self.workspace_id = Some(workspace_id);
        self
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Check whether this context grants a capability.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::SubmitProposal | Capability::ManageCatalog => self.has_role(Role::Admin),
            Capability::DecideProposal | Capability::ManageBilling => {
                self.company_id.is_some() && (self.has_role(Role::Owner) || self.has_role(Role::Admin))
            }
        }
    }

    /// Require a capability, rejecting the operation before any write.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(TasklyError::forbidden(format!(
                "missing capability '{}'",
                capability
            )))
        }
    }

    /// Require that the context is scoped to the given company.
    pub fn require_company(&self, company_id: &CompanyId) -> Result<()> {
        match &self.company_id {
            Some(id) if id == company_id => Ok(()),
            _ => Err(TasklyError::forbidden(
                "operation is scoped to a different company",
            )),
        }
    }
}
