//! Permission definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ModuleId, PermissionId};

/// Whether a permission is shared plumbing or a standalone capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    General,
    Unique,
}

impl PermissionKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Unique => "unique",
        }
    }
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The level a permission applies at.
///
/// System-scope permissions are platform plumbing and are always free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    System,
    Company,
    Workspace,
}

impl PermissionScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Company => "company",
            Self::Workspace => "workspace",
        }
    }
}

impl std::fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A priced atomic capability. Belongs to at most one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub kind: PermissionKind,
    pub scope: PermissionScope,
    /// Price in minor units. Always 0 for system scope.
    pub price: i64,
    /// The module this permission is assigned to, if any.
    pub module_id: Option<ModuleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// Build a new permission record. System scope forces the price to 0.
    #[must_use]
    pub fn new(params: NewPermission, now: DateTime<Utc>) -> Self {
        let price = effective_price(params.scope, params.price);
        Self {
            id: PermissionId::new(),
            name: params.name,
            kind: params.kind,
            scope: params.scope,
            price,
            module_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the price, keeping system scope free.
    pub fn set_price(&mut self, price: i64, now: DateTime<Utc>) {
        self.price = effective_price(self.scope, price);
        self.updated_at = now;
    }

    /// The price this permission contributes to a module aggregate.
    #[must_use]
    pub fn billable_price(&self) -> i64 {
        match self.scope {
            PermissionScope::System => 0,
            _ => self.price,
        }
    }
}

/// Parameters for creating a permission.
#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub kind: PermissionKind,
    pub scope: PermissionScope,
    pub price: i64,
}

fn effective_price(scope: PermissionScope, price: i64) -> i64 {
    match scope {
        PermissionScope::System => 0,
        _ => price,
    }
}
