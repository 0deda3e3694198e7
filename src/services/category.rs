//! Category service
//!
//! CRUD over categories. Deleting a category detaches its posts instead of
//! removing them.

use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, ListParams, Paginated, UpdateCategoryInput};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Category not found
    #[error("Category not found: {0}")]
    NotFound(i64),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    pub async fn find_all(
        &self,
        params: &ListParams,
    ) -> Result<Paginated<Category>, CategoryServiceError> {
        let (categories, total) = self
            .repo
            .list(params)
            .await
            .context("Failed to list categories")?;

        Ok(Paginated::new(categories, total, params))
    }

    pub async fn find_one(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))
    }

    /// Create a category
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the name is empty
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        validate_name(&input.name)?;

        let category = Category::new(input.name, input.description, input.status);
        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        tracing::info!(category_id = created.id, "Category created");
        Ok(created)
    }

    /// Merge the provided fields into an existing category and return it
    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self.find_one(id).await?;

        if let Some(name) = &input.name {
            validate_name(name)?;
        }

        input.merge_into(&mut category);
        category.updated_at = Utc::now();

        self.repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        Ok(category)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        self.find_one(id).await?;

        if !self.repo.delete(id).await.context("Failed to delete category")? {
            return Err(CategoryServiceError::NotFound(id));
        }

        tracing::info!(category_id = id, "Category deleted");
        Ok(())
    }

    /// Whether a category with this ID exists
    pub async fn exists(&self, id: i64) -> Result<bool, CategoryServiceError> {
        Ok(self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .is_some())
    }
}

fn validate_name(name: &str) -> Result<(), CategoryServiceError> {
    if name.trim().is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Category name cannot be empty".to_string(),
        ));
    }
    Ok(())
}
