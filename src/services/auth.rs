//! Authentication service
//!
//! Registration, login and refresh-token exchange. Every successful call
//! issues a fresh token pair and stores the refresh half on the user row, so
//! each user has at most one live refresh token. Exchanging it rotates the
//! stored value with a compare-and-swap, which makes the old token unusable
//! even when two exchanges race.

use crate::db::is_unique_violation;
use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, User};
use crate::services::password::{hash_password_async, verify_password_async};
use crate::services::token::{TokenError, TokenPair, TokenService};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Returns true if `email` looks like `local@domain.tld`
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Error types for authentication operations
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    /// Bad credentials or an unusable token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Email already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TokenError> for AuthServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(e) => {
                AuthServiceError::InternalError(anyhow::Error::new(e).context("Failed to sign token"))
            }
            TokenError::Expired => AuthServiceError::Unauthorized("Token has expired".to_string()),
            TokenError::Invalid | TokenError::WrongKind { .. } => {
                AuthServiceError::Unauthorized("Invalid token".to_string())
            }
        }
    }
}

/// Login request body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Refresh request body
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: String,
}

/// A newly registered user together with its first token pair
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    #[serde(flatten)]
    pub user: User,
    pub refresh_token: String,
    pub access_token: String,
}

/// Authentication service
pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(user_repo: Arc<dyn UserRepository>, tokens: Arc<TokenService>) -> Self {
        Self { user_repo, tokens }
    }

    /// Register a new user and sign them in.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the email is malformed or the password empty
    /// - `Conflict` if the email is already registered
    /// - `InternalError` for database or hashing errors
    pub async fn register(&self, input: CreateUserInput) -> Result<RegisteredUser, AuthServiceError> {
        validate_credentials(&input.email, &input.password)
            .map_err(AuthServiceError::ValidationError)?;

        let password_hash = hash_password_async(input.password).await?;
        let user = User::new(
            input.first_name,
            input.last_name,
            input.email,
            password_hash,
            input.status,
        );

        let mut created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(AuthServiceError::Conflict(format!(
                    "Email '{}' is already registered",
                    user.email
                )));
            }
            Err(e) => return Err(e.context("Failed to register user").into()),
        };

        let pair = self.tokens.issue_pair(created.id, &created.email)?;
        self.user_repo
            .set_refresh_token(created.id, Some(&pair.refresh_token))
            .await
            .context("Failed to store refresh token")?;
        created.refresh_token = Some(pair.refresh_token.clone());

        tracing::info!(user_id = created.id, "User registered");

        Ok(RegisteredUser {
            user: created,
            refresh_token: pair.refresh_token,
            access_token: pair.access_token,
        })
    }

    /// Verify credentials and issue a fresh token pair.
    ///
    /// The previous refresh token, if any, stops working.
    pub async fn login(&self, input: LoginInput) -> Result<TokenPair, AuthServiceError> {
        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to look up user")?;

        let Some(user) = user else {
            tracing::debug!("Login failed: unknown email");
            return Err(invalid_credentials());
        };

        if !verify_password_async(input.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = user.id, "Login failed: wrong password");
            return Err(invalid_credentials());
        }

        let pair = self.tokens.issue_pair(user.id, &user.email)?;
        self.user_repo
            .set_refresh_token(user.id, Some(&pair.refresh_token))
            .await
            .context("Failed to store refresh token")?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, rotating the stored token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthServiceError> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|e| {
            tracing::debug!("Refresh token rejected: {}", e);
            AuthServiceError::from(e)
        })?;

        let pair = self.tokens.issue_pair(claims.id, &claims.email)?;

        let rotated = self
            .user_repo
            .rotate_refresh_token(claims.id, &claims.email, refresh_token, &pair.refresh_token)
            .await
            .context("Failed to rotate refresh token")?;

        if !rotated {
            tracing::warn!(user_id = claims.id, "Stale refresh token presented");
            return Err(AuthServiceError::Unauthorized(
                "Refresh token is no longer valid".to_string(),
            ));
        }

        Ok(pair)
    }
}

fn invalid_credentials() -> AuthServiceError {
    AuthServiceError::Unauthorized("Invalid email or password".to_string())
}

/// Email format and non-empty password, shared with user creation
pub(crate) fn validate_credentials(email: &str, password: &str) -> Result<(), String> {
    if !is_valid_email(email) {
        return Err(format!("'{}' is not a valid email address", email));
    }
    if password.is_empty() {
        return Err("Password cannot be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UpdateUserInput;
    use crate::services::password::verify_password;
    use crate::services::UserService;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    async fn setup_test_service() -> (Arc<dyn UserRepository>, Arc<TokenService>, AuthService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool);
        let tokens = Arc::new(TokenService::new(SECRET, 3600, 604_800));
        let service = AuthService::new(user_repo.clone(), tokens.clone());

        (user_repo, tokens, service)
    }

    fn register_input(email: &str, password: &str) -> CreateUserInput {
        CreateUserInput {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            status: None,
        }
    }

    fn login_input(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    #[tokio::test]
    async fn test_register_persists_verifiable_refresh_token() {
        let (repo, tokens, service) = setup_test_service().await;

        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let stored = repo
            .get_by_id(registered.user.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(stored.refresh_token.as_deref(), Some(registered.refresh_token.as_str()));

        let claims = tokens
            .verify_refresh(stored.refresh_token.as_deref().unwrap_or_default())
            .expect("stored refresh token should verify");
        assert_eq!(claims.id, registered.user.id);
        assert_eq!(claims.email, "ada@example.com");

        assert!(tokens.verify_access(&registered.access_token).is_ok());
        assert!(verify_password("secret1", &stored.password_hash).expect("verify"));
    }

    #[tokio::test]
    async fn test_register_response_shape() {
        let (_repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let json = serde_json::to_value(&registered).expect("serialize");
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["first_name"], "Ada");
        assert!(json["refresh_token"].is_string());
        assert!(json["access_token"].is_string());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let (repo, _tokens, service) = setup_test_service().await;
        service
            .register(register_input("dup@example.com", "secret1"))
            .await
            .expect("first register");

        let result = service.register(register_input("dup@example.com", "other")).await;
        assert!(matches!(result, Err(AuthServiceError::Conflict(_))));

        let (_, total) = repo.list(&Default::default()).await.expect("list");
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_email_and_empty_password() {
        let (_repo, _tokens, service) = setup_test_service().await;

        let result = service.register(register_input("not-an-email", "secret1")).await;
        assert!(matches!(result, Err(AuthServiceError::ValidationError(_))));

        let result = service.register(register_input("ada@example.com", "")).await;
        assert!(matches!(result, Err(AuthServiceError::ValidationError(_))));
    }

    // ========================================================================
    // Login
    // ========================================================================

    #[tokio::test]
    async fn test_login_overwrites_refresh_token() {
        let (repo, tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let pair = service
            .login(login_input("ada@example.com", "secret1"))
            .await
            .expect("login");

        let claims = tokens.verify_access(&pair.access_token).expect("access");
        assert_eq!(claims.id, registered.user.id);

        let stored = repo.get_by_id(registered.user.id).await.expect("get").expect("exists");
        assert_eq!(stored.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));
        assert_ne!(pair.refresh_token, registered.refresh_token);
    }

    #[tokio::test]
    async fn test_login_failures_write_nothing() {
        let (repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let result = service.login(login_input("ada@example.com", "wrong")).await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));

        let result = service.login(login_input("nobody@example.com", "secret1")).await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));

        let stored = repo.get_by_id(registered.user.id).await.expect("get").expect("exists");
        assert_eq!(stored.refresh_token.as_deref(), Some(registered.refresh_token.as_str()));
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let (repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let pair = service.refresh(&registered.refresh_token).await.expect("refresh");
        assert_ne!(pair.refresh_token, registered.refresh_token);

        let stored = repo.get_by_id(registered.user.id).await.expect("get").expect("exists");
        assert_eq!(stored.refresh_token.as_deref(), Some(pair.refresh_token.as_str()));

        // The rotated-away token is dead, the new one works.
        let stale = service.refresh(&registered.refresh_token).await;
        assert!(matches!(stale, Err(AuthServiceError::Unauthorized(_))));
        assert!(service.refresh(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejected_after_email_change() {
        let (repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("old@example.com", "secret1"))
            .await
            .expect("register");

        let users = UserService::new(repo.clone());
        users
            .update(
                registered.user.id,
                UpdateUserInput {
                    email: Some("new@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update email");

        let result = service.refresh(&registered.refresh_token).await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));

        // A failed exchange leaves the stored token untouched.
        let stored = repo.get_by_id(registered.user.id).await.expect("get").expect("exists");
        assert_eq!(stored.refresh_token.as_deref(), Some(registered.refresh_token.as_str()));
    }

    #[tokio::test]
    async fn test_refresh_after_login_invalidates_previous_token() {
        let (_repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");
        service
            .login(login_input("ada@example.com", "secret1"))
            .await
            .expect("login");

        let result = service.refresh(&registered.refresh_token).await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token_and_garbage() {
        let (_repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let result = service.refresh(&registered.access_token).await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));

        let result = service.refresh("garbage").await;
        assert!(matches!(result, Err(AuthServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_only_one_wins() {
        let (_repo, _tokens, service) = setup_test_service().await;
        let registered = service
            .register(register_input("ada@example.com", "secret1"))
            .await
            .expect("register");

        let (a, b) = tokio::join!(
            service.refresh(&registered.refresh_token),
            service.refresh(&registered.refresh_token)
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("plain"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
    }
}
