//! Companies and company categories.
//!
//! Categories are administrator-managed labels with unique slugs; a
//! category that still has companies attached cannot be deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthContext, Capability};
use crate::catalog::derive_slug;
use crate::error::{Result, TasklyError};
use crate::ids::{CategoryId, CompanyId};

/// A tenant company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    #[must_use]
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: CompanyId::new(),
            name: name.into(),
            category_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An administrator-managed company category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyCategory {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trait for storing companies and categories.
#[async_trait]
pub trait CompanyStore: Send + Sync {
    /// Insert or update a company record.
    async fn save_company(&self, company: &Company) -> Result<()>;

    /// Get a company by ID.
    async fn get_company(&self, id: &CompanyId) -> Result<Option<Company>>;

    /// Count companies attached to a category.
    async fn count_companies_in_category(&self, category_id: &CategoryId) -> Result<usize>;

    /// Insert a category. Fails with a conflict if the slug is taken.
    async fn insert_category(&self, category: &CompanyCategory) -> Result<()>;

    /// Get a category by ID.
    async fn get_category(&self, id: &CategoryId) -> Result<Option<CompanyCategory>>;

    /// Delete a category row.
    async fn delete_category(&self, id: &CategoryId) -> Result<()>;

    /// List all categories.
    async fn list_categories(&self) -> Result<Vec<CompanyCategory>>;
}

/// Manager for companies and categories.
pub struct CompanyManager<S> {
    store: S,
}

impl<S: Clone> Clone for CompanyManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: CompanyStore> CompanyManager<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a category. Slug uniqueness is enforced by the store so the
    /// check and the insert cannot race.
    pub async fn create_category(
        &self,
        ctx: &AuthContext,
        name: impl Into<String>,
    ) -> Result<CompanyCategory> {
        ctx.require(Capability::ManageCatalog)?;

        let name = name.into();
        if name.trim().is_empty() {
            return Err(TasklyError::validation("name", "must not be empty"));
        }

        let now = Utc::now();
        let category = CompanyCategory {
            id: CategoryId::new(),
            slug: derive_slug(&name),
            name,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_category(&category).await?;

        tracing::debug!(category_id = %category.id, slug = %category.slug, "category created");

        Ok(category)
    }

    /// Delete a category.
    ///
    /// Rejected with a conflict while any company is still attached; the
    /// category and its companies are left unchanged.
    pub async fn delete_category(&self, ctx: &AuthContext, id: &CategoryId) -> Result<()> {
        ctx.require(Capability::ManageCatalog)?;

        let category = self
            .store
            .get_category(id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("category {}", id)))?;

        let in_use = self.store.count_companies_in_category(id).await?;
        if in_use > 0 {
            return Err(TasklyError::conflict(format!(
                "category '{}' still has {} associated companies",
                category.name, in_use
            )));
        }

        self.store.delete_category(id).await?;

        tracing::debug!(category_id = %id, "category deleted");

        Ok(())
    }

    /// Assign a company to a category.
    pub async fn set_company_category(
        &self,
        ctx: &AuthContext,
        company_id: &CompanyId,
        category_id: Option<CategoryId>,
    ) -> Result<()> {
        ctx.require(Capability::ManageCatalog)?;

        let mut company = self
            .store
            .get_company(company_id)
            .await?
            .ok_or_else(|| TasklyError::not_found(format!("company {}", company_id)))?;

        if let Some(ref id) = category_id {
            if self.store.get_category(id).await?.is_none() {
                return Err(TasklyError::not_found(format!("category {}", id)));
            }
        }

        company.category_id = category_id;
        company.updated_at = Utc::now();
        self.store.save_company(&company).await
    }

    pub async fn list_categories(&self) -> Result<Vec<CompanyCategory>> {
        self.store.list_categories().await
    }
}

/// In-memory company store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory company store.
    #[derive(Default, Clone)]
    pub struct InMemoryCompanyStore {
        inner: Arc<InMemoryCompanyStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryCompanyStoreInner {
        companies: RwLock<HashMap<CompanyId, Company>>,
        categories: RwLock<HashMap<CategoryId, CompanyCategory>>,
    }

    impl InMemoryCompanyStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CompanyStore for InMemoryCompanyStore {
        async fn save_company(&self, company: &Company) -> Result<()> {
            self.inner
                .companies
                .write()
                .unwrap()
                .insert(company.id.clone(), company.clone());
            Ok(())
        }

        async fn get_company(&self, id: &CompanyId) -> Result<Option<Company>> {
            Ok(self.inner.companies.read().unwrap().get(id).cloned())
        }

        async fn count_companies_in_category(&self, category_id: &CategoryId) -> Result<usize> {
            Ok(self
                .inner
                .companies
                .read()
                .unwrap()
                .values()
                .filter(|c| c.category_id.as_ref() == Some(category_id))
                .count())
        }

        async fn insert_category(&self, category: &CompanyCategory) -> Result<()> {
            let mut categories = self.inner.categories.write().unwrap();
            if categories.values().any(|c| c.slug == category.slug) {
                return Err(TasklyError::conflict(format!(
                    "category slug '{}' already exists",
                    category.slug
                )));
            }
            categories.insert(category.id.clone(), category.clone());
            Ok(())
        }

        async fn get_category(&self, id: &CategoryId) -> Result<Option<CompanyCategory>> {
            Ok(self.inner.categories.read().unwrap().get(id).cloned())
        }

        async fn delete_category(&self, id: &CategoryId) -> Result<()> {
            self.inner.categories.write().unwrap().remove(id);
            Ok(())
        }

        async fn list_categories(&self) -> Result<Vec<CompanyCategory>> {
            let mut all: Vec<CompanyCategory> =
                self.inner.categories.read().unwrap().values().cloned().collect();
            all.sort_by(|a, b| a.slug.cmp(&b.slug));
            Ok(all)
        }
    }
}
