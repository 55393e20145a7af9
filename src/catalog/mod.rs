//! Purchasable capability catalog.
//!
//! Permissions are atomic priced capabilities, grouped into modules.
//! Standard modules are bundled into plans; add-on modules are billed
//! separately through the proposal workflow.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskly_billing::catalog::{CatalogManager, NewPlan, BillingCycle};
//!
//! let manager = CatalogManager::new(store);
//! let plan = manager.create_plan(&ctx, NewPlan {
//!     name: "Team".to_string(),
//!     price_monthly: 150_000,
//!     price_yearly: Some(1_500_000),
//!     is_basic: false,
//! }).await?;
//! ```

pub mod manager;
pub mod permission;
pub mod plan;
pub mod module;
pub mod storage;

pub use manager::CatalogManager;
pub use module::{Module, ModuleKind, ModuleScope, NewModule, derive_slug};
pub use permission::{NewPermission, Permission, PermissionKind, PermissionScope};
pub use plan::{BillingCycle, NewPlan, Plan};
pub use storage::CatalogStore;

#[cfg(any(test, feature = "test-support"))]
pub use storage::test::InMemoryCatalogStore;
