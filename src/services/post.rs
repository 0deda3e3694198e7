//! Post service
//!
//! CRUD over posts. A post is owned by the authenticated caller that created
//! it and may reference a category, which must exist at write time.

use crate::db::repositories::{CategoryRepository, PostRepository, UserRepository};
use crate::models::{CreatePostInput, ListParams, Paginated, Post, UpdatePostInput};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Post not found
    #[error("Post not found: {0}")]
    NotFound(i64),

    /// Referenced category does not exist
    #[error("Category not found: {0}")]
    CategoryNotFound(i64),

    /// The caller's account no longer exists
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Post service
pub struct PostService {
    post_repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    category_repo: Arc<dyn CategoryRepository>,
}

impl PostService {
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        category_repo: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self {
            post_repo,
            user_repo,
            category_repo,
        }
    }

    /// List posts with owner and category, newest first
    pub async fn find_all(&self, params: &ListParams) -> Result<Paginated<Post>, PostServiceError> {
        let (posts, total) = self
            .post_repo
            .list(params)
            .await
            .context("Failed to list posts")?;

        Ok(Paginated::new(posts, total, params))
    }

    pub async fn find_one(&self, id: i64) -> Result<Post, PostServiceError> {
        self.post_repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound(id))
    }

    /// Create a post owned by `user_id`.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the title or thumbnail is empty
    /// - `Unauthorized` if the owner no longer exists
    /// - `CategoryNotFound` if `category_id` does not resolve
    /// - `InternalError` if the new post cannot be read back
    pub async fn create(
        &self,
        user_id: i64,
        input: CreatePostInput,
    ) -> Result<Post, PostServiceError> {
        if input.title.trim().is_empty() {
            return Err(PostServiceError::ValidationError(
                "Title cannot be empty".to_string(),
            ));
        }
        if input.thumbnail.is_empty() {
            return Err(PostServiceError::ValidationError(
                "Thumbnail is required".to_string(),
            ));
        }

        let owner = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up post owner")?;
        if owner.is_none() {
            tracing::warn!(user_id, "Post create by a user that no longer exists");
            return Err(PostServiceError::Unauthorized(
                "Account no longer exists".to_string(),
            ));
        }

        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let id = self
            .post_repo
            .create(&input.into_new_post(user_id))
            .await
            .context("Failed to create post")?;

        let post = self
            .post_repo
            .get_by_id(id)
            .await
            .context("Failed to read back created post")?
            .ok_or_else(|| anyhow::anyhow!("Created post {} could not be read back", id))?;

        tracing::info!(post_id = post.id, user_id, "Post created");
        Ok(post)
    }

    /// Merge the provided fields into an existing post and return it
    pub async fn update(&self, id: i64, input: UpdatePostInput) -> Result<Post, PostServiceError> {
        let mut post = self.find_one(id).await?;

        if let Some(title) = &input.title {
            if title.trim().is_empty() {
                return Err(PostServiceError::ValidationError(
                    "Title cannot be empty".to_string(),
                ));
            }
        }
        if let Some(Some(category_id)) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let category_changed = input.category_id.is_some();
        input.merge_into(&mut post);
        post.updated_at = Utc::now();

        self.post_repo
            .update(&post)
            .await
            .context("Failed to update post")?;

        if category_changed {
            // Refresh the embedded category summary.
            return self.find_one(id).await;
        }
        Ok(post)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        self.find_one(id).await?;

        if !self.post_repo.delete(id).await.context("Failed to delete post")? {
            return Err(PostServiceError::NotFound(id));
        }

        tracing::info!(post_id = id, "Post deleted");
        Ok(())
    }

    async fn ensure_category(&self, category_id: i64) -> Result<(), PostServiceError> {
        self.category_repo
            .get_by_id(category_id)
            .await
            .context("Failed to look up category")?
            .map(|_| ())
            .ok_or(PostServiceError::CategoryNotFound(category_id))
    }
}
