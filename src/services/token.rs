//! Signed token issuance and verification
//!
//! Access and refresh tokens are HS256 JWTs signed with one secret. Both carry
//! the user's `{id, email}`; the `kind` claim keeps a refresh token from being
//! accepted where an access token is expected and the other way round.
//! A random `jti` makes every issued token distinct, even two issued for the
//! same user within the same second.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;

/// Which half of a token pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub id: i64,
    pub email: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
    pub kind: TokenKind,
}

/// Freshly issued access + refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Expected {expected:?} token")]
    WrongKind { expected: TokenKind },
}

/// Signs and verifies tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Build from the auth config with an already resolved secret
    pub fn from_config(config: &AuthConfig, secret: &str) -> Self {
        Self::new(
            secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        )
    }

    /// Sign a new access + refresh token for the user
    pub fn issue_pair(&self, user_id: i64, email: &str) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.sign(user_id, email, TokenKind::Access)?,
            refresh_token: self.sign(user_id, email, TokenKind::Refresh)?,
        })
    }

    /// Verify an access token presented to the request guard
    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Access)
    }

    /// Verify a refresh token presented for exchange
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn sign(&self, user_id: i64, email: &str, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };

        let claims = Claims {
            id: user_id,
            email: email.to_string(),
            iat: now,
            exp: now + ttl,
            jti: Uuid::new_v4().to_string(),
            kind,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?
            .claims;

        if claims.kind != expected {
            return Err(TokenError::WrongKind { expected });
        }

        Ok(claims)
    }
}
