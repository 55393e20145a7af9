//! Module definitions and slug derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ModuleId;

/// How a module is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Bundled into plans; displayed price aggregates its permissions.
    Standard,
    /// Billed independently via the proposal workflow.
    Addon,
}

impl ModuleKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Addon => "addon",
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The level a module applies at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleScope {
    Company,
    Workspace,
}

impl ModuleScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Workspace => "workspace",
        }
    }
}

impl std::fmt::Display for ModuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A purchasable bundle of permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub slug: String,
    pub kind: ModuleKind,
    pub scope: ModuleScope,
    /// Standalone price in minor units; only meaningful for add-on modules.
    /// Standard modules surface the aggregate of their permissions instead.
    pub price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Module {
    /// Build a new module record. The slug derives from the name.
    #[must_use]
    pub fn new(params: NewModule, now: DateTime<Utc>) -> Self {
        let slug = derive_slug(&params.name);
        Self {
            id: ModuleId::new(),
            name: params.name,
            slug,
            kind: params.kind,
            scope: params.scope,
            price: params.price,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rename the module; the slug follows the name.
    pub fn rename(&mut self, name: impl Into<String>, now: DateTime<Utc>) {
        self.name = name.into();
        self.slug = derive_slug(&self.name);
        self.updated_at = now;
    }

    /// Whether this module can be sold through a proposal.
    #[must_use]
    pub fn is_billable_addon(&self) -> bool {
        self.is_active && self.kind == ModuleKind::Addon
    }
}

/// Parameters for creating a module.
#[derive(Debug, Clone)]
pub struct NewModule {
    pub name: String,
    pub kind: ModuleKind,
    pub scope: ModuleScope,
    pub price: i64,
}

/// Derive a URL-safe slug from a display name.
///
/// Lowercases, maps runs of non-alphanumerics to single dashes, and trims
/// leading/trailing dashes.
#[must_use]
pub fn derive_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
