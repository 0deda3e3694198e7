//! User service
//!
//! CRUD over user accounts plus the avatar path update. Passwords given to
//! `create` or `update` are hashed before they reach the repository.

use crate::db::is_unique_violation;
use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, ListParams, Paginated, UpdateUserInput, User};
use crate::services::auth::{is_valid_email, validate_credentials};
use crate::services::password::hash_password_async;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// User not found
    #[error("User not found: {0}")]
    NotFound(i64),

    /// Email already taken
    #[error("Email '{0}' is already registered")]
    Conflict(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>) -> Self {
        Self { user_repo }
    }

    /// List users, newest first
    pub async fn find_all(&self, params: &ListParams) -> Result<Paginated<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(params)
            .await
            .context("Failed to list users")?;

        Ok(Paginated::new(users, total, params))
    }

    /// Get a user by ID
    pub async fn find_one(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound(id))
    }

    /// Create a user
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the email is malformed or the password empty
    /// - `Conflict` if the email is already registered
    pub async fn create(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        validate_credentials(&input.email, &input.password)
            .map_err(UserServiceError::ValidationError)?;

        let password_hash = hash_password_async(input.password).await?;
        let user = User::new(
            input.first_name,
            input.last_name,
            input.email,
            password_hash,
            input.status,
        );

        let result = self.user_repo.create(&user).await;
        match result {
            Ok(created) => {
                tracing::info!(user_id = created.id, "User created");
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::Conflict(user.email)),
            Err(e) => Err(e.context("Failed to create user").into()),
        }
    }

    /// Merge the provided fields into an existing user.
    ///
    /// A provided password is re-hashed. Returns the merged user.
    pub async fn update(&self, id: i64, input: UpdateUserInput) -> Result<User, UserServiceError> {
        let mut user = self.find_one(id).await?;

        if let Some(email) = &input.email {
            if !is_valid_email(email) {
                return Err(UserServiceError::ValidationError(format!(
                    "'{}' is not a valid email address",
                    email
                )));
            }
        }

        if let Some(password) = input.password.clone() {
            if password.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Password cannot be empty".to_string(),
                ));
            }
            user.password_hash = hash_password_async(password).await?;
        }

        input.merge_into(&mut user);
        user.updated_at = Utc::now();

        let result = self.user_repo.update(&user).await;
        match result {
            Ok(()) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::Conflict(user.email)),
            Err(e) => Err(e.context("Failed to update user").into()),
        }
    }

    /// Delete a user; their posts go with them
    pub async fn delete(&self, id: i64) -> Result<(), UserServiceError> {
        self.find_one(id).await?;

        if !self.user_repo.delete(id).await.context("Failed to delete user")? {
            return Err(UserServiceError::NotFound(id));
        }

        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }

    /// Store a new avatar path and return the updated user
    pub async fn set_avatar(&self, id: i64, avatar: &str) -> Result<User, UserServiceError> {
        if !self
            .user_repo
            .set_avatar(id, avatar)
            .await
            .context("Failed to set avatar")?
        {
            return Err(UserServiceError::NotFound(id));
        }

        self.find_one(id).await
    }
}
