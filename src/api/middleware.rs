//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the JSON error body and its status mapping
//! - `AuthUser`, the bearer-token guard used as a handler argument

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::UploadConfig;
use crate::db::repositories::{SqlxCategoryRepository, SqlxPostRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::services::{
    AuthService, AuthServiceError, CategoryService, CategoryServiceError, PostService,
    PostServiceError, TokenService, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub tokens: Arc<TokenService>,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub upload_config: Arc<UploadConfig>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, tokens: Arc<TokenService>, upload_config: UploadConfig) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());

        Self {
            auth_service: Arc::new(AuthService::new(user_repo.clone(), tokens.clone())),
            user_service: Arc::new(UserService::new(user_repo.clone())),
            post_service: Arc::new(PostService::new(post_repo, user_repo, category_repo.clone())),
            category_service: Arc::new(CategoryService::new(category_repo)),
            pool,
            tokens,
            upload_config: Arc::new(upload_config),
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and return an opaque 500
    pub fn internal(err: &anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "BAD_REQUEST" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<AuthServiceError> for ApiError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::Unauthorized(msg) => ApiError::unauthorized(msg),
            AuthServiceError::Conflict(msg) => ApiError::conflict(msg),
            AuthServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AuthServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            UserServiceError::Conflict(_) => ApiError::conflict(err.to_string()),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(_) | PostServiceError::CategoryNotFound(_) => {
                ApiError::not_found(err.to_string())
            }
            PostServiceError::Unauthorized(msg) => ApiError::unauthorized(msg),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

/// Extract the token from `Authorization: Bearer <token>`
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Identity of the caller, taken from a verified access token.
///
/// Adding this as a handler argument guards the route: a missing, malformed,
/// expired or non-access token is rejected with 401 before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

        let claims = state.tokens.verify_access(token).map_err(|e| {
            tracing::debug!("Access token rejected: {}", e);
            ApiError::unauthorized("Invalid or expired token")
        })?;

        Ok(AuthUser {
            id: claims.id,
            email: claims.email,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
