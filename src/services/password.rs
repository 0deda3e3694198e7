//! Password hashing module
//!
//! Passwords are hashed with bcrypt at a fixed cost of 10. Each hash embeds its
//! own random salt, so hashing the same password twice gives different output.
//!
//! bcrypt is CPU bound; async callers should go through [`hash_password_async`]
//! and [`verify_password_async`], which run on the blocking thread pool.

use anyhow::{Context, Result};

/// bcrypt work factor
pub const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt.
///
/// # Example
///
/// ```ignore
/// use quillpost::services::password::hash_password;
///
/// let hash = hash_password("my_secure_password")?;
/// assert!(hash.starts_with("$2b$10$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).context("Password hashing failed")
}

/// Verify a password against a stored bcrypt hash.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash is
/// malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Password verification failed")
}

/// [`hash_password`] on the blocking pool
pub async fn hash_password_async(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")?
}

/// [`verify_password`] on the blocking pool
pub async fn verify_password_async(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")?
}
