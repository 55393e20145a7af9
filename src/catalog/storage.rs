//! Storage trait for the capability catalog.
//!
//! Implement this trait to persist the catalog to your database. An
//! in-memory implementation is provided for testing.

use async_trait::async_trait;

use super::module::Module;
use super::permission::Permission;
use super::plan::Plan;
use crate::error::Result;
use crate::ids::{ModuleId, PermissionId, PlanId};

/// Trait for storing catalog data.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Permissions

    /// Insert or update a permission record.
    async fn save_permission(&self, permission: &Permission) -> Result<()>;

    /// Get a permission by ID.
    async fn get_permission(&self, id: &PermissionId) -> Result<Option<Permission>>;

    /// List every permission, assigned or homeless.
    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    /// List permissions assigned to a module.
    async fn permissions_for_module(&self, module_id: &ModuleId) -> Result<Vec<Permission>>;

    // Modules

    /// Insert or update a module record.
    async fn save_module(&self, module: &Module) -> Result<()>;

    /// Get a module by ID.
    async fn get_module(&self, id: &ModuleId) -> Result<Option<Module>>;

    /// Get a module by slug.
    async fn get_module_by_slug(&self, slug: &str) -> Result<Option<Module>>;

    /// List all modules.
    async fn list_modules(&self) -> Result<Vec<Module>>;

    // Plans

    /// Insert or update a plan record.
    async fn save_plan(&self, plan: &Plan) -> Result<()>;

    /// Get a plan by ID.
    async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>>;

    /// List plans currently offered for subscription.
    async fn list_active_plans(&self) -> Result<Vec<Plan>>;
}

/// In-memory catalog store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory catalog store.
    ///
    /// Wraps data in Arc for cheap cloning.
    #[derive(Default, Clone)]
    pub struct InMemoryCatalogStore {
        inner: Arc<InMemoryCatalogStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryCatalogStoreInner {
        permissions: RwLock<HashMap<PermissionId, Permission>>,
        modules: RwLock<HashMap<ModuleId, Module>>,
        plans: RwLock<HashMap<PlanId, Plan>>,
    }

    impl InMemoryCatalogStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CatalogStore for InMemoryCatalogStore {
        async fn save_permission(&self, permission: &Permission) -> Result<()> {
            self.inner
                .permissions
                .write()
                .unwrap()
                .insert(permission.id.clone(), permission.clone());
            Ok(())
        }

        async fn get_permission(&self, id: &PermissionId) -> Result<Option<Permission>> {
            Ok(self.inner.permissions.read().unwrap().get(id).cloned())
        }

        async fn list_permissions(&self) -> Result<Vec<Permission>> {
            Ok(self.inner.permissions.read().unwrap().values().cloned().collect())
        }

        async fn permissions_for_module(&self, module_id: &ModuleId) -> Result<Vec<Permission>> {
            Ok(self
                .inner
                .permissions
                .read()
                .unwrap()
                .values()
                .filter(|p| p.module_id.as_ref() == Some(module_id))
                .cloned()
                .collect())
        }

        async fn save_module(&self, module: &Module) -> Result<()> {
            self.inner
                .modules
                .write()
                .unwrap()
                .insert(module.id.clone(), module.clone());
            Ok(())
        }

        async fn get_module(&self, id: &ModuleId) -> Result<Option<Module>> {
            Ok(self.inner.modules.read().unwrap().get(id).cloned())
        }

        async fn get_module_by_slug(&self, slug: &str) -> Result<Option<Module>> {
            Ok(self
                .inner
                .modules
                .read()
                .unwrap()
                .values()
                .find(|m| m.slug == slug)
                .cloned())
        }

        async fn list_modules(&self) -> Result<Vec<Module>> {
            Ok(self.inner.modules.read().unwrap().values().cloned().collect())
        }

        async fn save_plan(&self, plan: &Plan) -> Result<()> {
            self.inner
                .plans
                .write()
                .unwrap()
                .insert(plan.id.clone(), plan.clone());
            Ok(())
        }

        async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>> {
            Ok(self.inner.plans.read().unwrap().get(id).cloned())
        }

        async fn list_active_plans(&self) -> Result<Vec<Plan>> {
            let mut active: Vec<Plan> = self
                .inner
                .plans
                .read()
                .unwrap()
                .values()
                .filter(|p| p.is_active)
                .cloned()
                .collect();
            active.sort_by_key(|p| p.price_monthly);
            Ok(active)
        }
    }
}
