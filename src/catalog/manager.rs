//! Catalog management operations.
//!
//! All mutations require the `ManageCatalog` capability and validate their
//! input before touching the store.

use chrono::Utc;

use super::module::{Module, ModuleKind, NewModule};
use super::permission::{NewPermission, Permission};
use super::plan::{NewPlan, Plan};
use super::storage::CatalogStore;
use crate::auth::{AuthContext, Capability};
use crate::error::{Result, TasklyError};
use crate::ids::{ModuleId, PermissionId, PlanId};

/// Manager for the permission/module/plan catalog.
pub struct CatalogManager<S> {
    store: S,
}

impl<S: Clone> Clone for CatalogManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: CatalogStore> CatalogManager<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a permission. System-scope permissions are forced free.
    pub async fn create_permission(
        &self,
        ctx: &AuthContext,
        params: NewPermission,
    ) -> Result<Permission> {
        ctx.require(Capability::ManageCatalog)?;

        if params.name.trim().is_empty() {
            return Err(TasklyError::validation("name", "must not be empty"));
        }
        if params.price < 0 {
            return Err(TasklyError::validation("price", "must not be negative"));
        }

        let permission = Permission::new(params, Utc::now());
        self.store.save_permission(&permission).await?;

        tracing::debug!(
            permission_id = %permission.id,
            scope = %permission.scope,
            price = permission.price,
            "permission created"
        );

        Ok(permission)
    }

    /// Re-price a permission. System-scope permissions stay free.
    pub async fn set_permission_price(
        &self,
        ctx: &AuthContext,
        permission_id: &PermissionId,
        price: i64,
    ) -> Result<Permission> {
        ctx.require(Capability::ManageCatalog)?;

        if price < 0 {
            return Err(TasklyError::validation("price", "must not be negative"));
        }

        let mut permission = self
            .store
            .get_permission(permission_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("permission {}", permission_id)))?;

        permission.set_price(price, Utc::now());
        self.store.save_permission(&permission).await?;

        Ok(permission)
    }

    /// Assign a permission to a module. Reassignment moves it.
    pub async fn assign_permission(
        &self,
        ctx: &AuthContext,
        permission_id: &PermissionId,
        module_id: &ModuleId,
    ) -> Result<()> {
        ctx.require(Capability::ManageCatalog)?;

        let mut permission = self
            .store
            .get_permission(permission_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("permission {}", permission_id)))?;

        if self.store.get_module(module_id).await?.is_none() {
            return Err(TasklyError::not_found(format!("module {}", module_id)));
        }

        permission.module_id = Some(module_id.clone());
        permission.updated_at = Utc::now();
        self.store.save_permission(&permission).await?;

        tracing::debug!(
            permission_id = %permission_id,
            module_id = %module_id,
            "permission assigned to module"
        );

        Ok(())
    }

    /// Detach a permission from its module, leaving it homeless.
    pub async fn remove_permission(
        &self,
        ctx: &AuthContext,
        permission_id: &PermissionId,
    ) -> Result<()> {
        ctx.require(Capability::ManageCatalog)?;

        let mut permission = self
            .store
            .get_permission(permission_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("permission {}", permission_id)))?;

        permission.module_id = None;
        permission.updated_at = Utc::now();
        self.store.save_permission(&permission).await?;

        tracing::debug!(permission_id = %permission_id, "permission detached from module");

        Ok(())
    }

    /// Create a module. The slug derives from the name.
    pub async fn create_module(&self, ctx: &AuthContext, params: NewModule) -> Result<Module> {
        ctx.require(Capability::ManageCatalog)?;

        if params.name.trim().is_empty() {
            return Err(TasklyError::validation("name", "must not be empty"));
        }
        if params.price < 0 {
            return Err(TasklyError::validation("price", "must not be negative"));
        }

        let module = Module::new(params, Utc::now());
        self.store.save_module(&module).await?;

        tracing::debug!(
            module_id = %module.id,
            slug = %module.slug,
            kind = %module.kind,
            "module created"
        );

        Ok(module)
    }

    /// Activate or deactivate a module.
    pub async fn set_module_active(
        &self,
        ctx: &AuthContext,
        module_id: &ModuleId,
        is_active: bool,
    ) -> Result<()> {
        ctx.require(Capability::ManageCatalog)?;

        let mut module = self
            .store
            .get_module(module_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("module {}", module_id)))?;
        module.is_active = is_active;
        module.updated_at = Utc::now();
        self.store.save_module(&module).await
    }

    /// The displayed price of a module.
    ///
    /// Standard modules aggregate their permissions' prices on every read
    /// (system-scope permissions contribute 0); the value is never persisted
    /// so it cannot go stale. Add-on modules carry their own price.
    pub async fn module_price(&self, module_id: &ModuleId) -> Result<i64> {
        let module = self
            .store
            .get_module(module_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("module {}", module_id)))?;

        match module.kind {
            ModuleKind::Addon => Ok(module.price),
            ModuleKind::Standard => {
                let permissions = self.store.permissions_for_module(module_id).await?;
                Ok(permissions.iter().map(|p| p.billable_price()).sum())
            }
        }
    }

    /// Create a plan.
    ///
    /// Basic plans are monthly-only; supplying a yearly price is rejected
    /// here rather than at the presentation layer.
    pub async fn create_plan(&self, ctx: &AuthContext, params: NewPlan) -> Result<Plan> {
        ctx.require(Capability::ManageCatalog)?;

        if params.name.trim().is_empty() {
            return Err(TasklyError::validation("name", "must not be empty"));
        }
        if params.price_monthly < 0 {
            return Err(TasklyError::validation("price_monthly", "must not be negative"));
        }
        if params.is_basic && params.price_yearly.is_some() {
            return Err(TasklyError::validation(
                "price_yearly",
                "basic plans are billed monthly only",
            ));
        }
        if let Some(yearly) = params.price_yearly {
            if yearly < 0 {
                return Err(TasklyError::validation("price_yearly", "must not be negative"));
            }
        }

        let plan = Plan::new(params, Utc::now());
        self.store.save_plan(&plan).await?;

        tracing::debug!(plan_id = %plan.id, slug = %plan.slug, "plan created");

        Ok(plan)
    }

    /// Bundle a standard module into a plan.
    pub async fn attach_module_to_plan(
        &self,
        ctx: &AuthContext,
        plan_id: &PlanId,
        module_id: &ModuleId,
    ) -> Result<()> {
        ctx.require(Capability::ManageCatalog)?;

        let mut plan = self
            .store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("plan {}", plan_id)))?;

        let module = self
            .store
            .get_module(module_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("module {}", module_id)))?;

        if module.kind != ModuleKind::Standard {
            return Err(TasklyError::bad_request(
                "add-on modules are billed separately and cannot be bundled into a plan",
            ));
        }

        if !plan.module_ids.contains(module_id) {
            plan.module_ids.push(module_id.clone());
            plan.updated_at = Utc::now();
            self.store.save_plan(&plan).await?;
        }

        Ok(())
    }

    /// Get a plan by ID.
    pub async fn get_plan(&self, plan_id: &PlanId) -> Result<Plan> {
        self.store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("plan {}", plan_id)))
    }

    /// List plans currently offered for subscription.
    pub async fn list_active_plans(&self) -> Result<Vec<Plan>> {
        self.store.list_active_plans().await
    }

    /// Get a module by ID.
    pub async fn get_module(&self, module_id: &ModuleId) -> Result<Module> {
        self.store
            .get_module(module_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("module {}", module_id)))
    }
}
