//! User model
//!
//! A registered account. The password hash and the current refresh token are
//! stored on the row but never serialized into API responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default status for new rows
pub const STATUS_ACTIVE: i32 = 1;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (bcrypt)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Currently valid refresh token, if any
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    /// Stored avatar path, relative to the server root
    pub avatar: Option<String>,
    pub status: i32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User.
    ///
    /// The password must already be hashed; see `services::password::hash_password`.
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
        status: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            first_name,
            last_name,
            email,
            password_hash,
            refresh_token: None,
            avatar: None,
            status: status.unwrap_or(STATUS_ACTIVE),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a user (registration or admin create)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    /// Plaintext password, hashed by the service
    pub password: String,
    #[serde(default)]
    pub status: Option<i32>,
}

/// Partial update for a user; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Plaintext password, re-hashed by the service
    pub password: Option<String>,
    pub status: Option<i32>,
}

impl UpdateUserInput {
    /// Apply the provided fields onto `user`.
    /// The password is not touched here; the caller hashes and sets it.
    pub fn merge_into(self, user: &mut User) {
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(status) = self.status {
            user.status = status;
        }
    }
}

/// Owner summary embedded in post responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
        }
    }
}
