//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL
//!
//! Email uniqueness is enforced by the `idx_users_email` unique index. Inserts
//! and updates that collide surface as a database error that
//! [`crate::db::is_unique_violation`] recognizes.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return it with its assigned ID
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Write profile fields (names, email, password hash, avatar, status)
    async fn update(&self, user: &User) -> Result<()>;

    /// Delete a user, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// List users matching the search keyword on first name, last name or email
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Overwrite the stored refresh token
    async fn set_refresh_token(&self, id: i64, token: Option<&str>) -> Result<()>;

    /// Replace the stored refresh token only if it still equals `current`
    /// and the user still has `email`.
    ///
    /// Returns `false` otherwise, which means `current` was already rotated
    /// away or revoked, or was issued for an email the account no longer has.
    async fn rotate_refresh_token(
        &self,
        id: i64,
        email: &str,
        current: &str,
        next: &str,
    ) -> Result<bool>;

    /// Set the avatar path, returning whether the user exists
    async fn set_avatar(&self, id: i64, avatar: &str) -> Result<bool>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_user_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_email_sqlite(pool, email).await,
            Backend::Mysql(pool) => get_user_by_email_mysql(pool, email).await,
        }
    }

    async fn update(&self, user: &User) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => update_user_mysql(pool, user).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM users WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete user")?;

        Ok(affected > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_users_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_users_mysql(pool, params).await,
        }
    }

    async fn set_refresh_token(&self, id: i64, token: Option<&str>) -> Result<()> {
        let now = Utc::now();
        let sql = "UPDATE users SET refresh_token = ?, updated_at = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(token)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(token)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ()),
        }
        .context("Failed to store refresh token")
    }

    async fn rotate_refresh_token(
        &self,
        id: i64,
        email: &str,
        current: &str,
        next: &str,
    ) -> Result<bool> {
        let now = Utc::now();
        let sql = r#"
            UPDATE users
            SET refresh_token = ?, updated_at = ?
            WHERE id = ? AND email = ? AND refresh_token = ?
        "#;
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(next)
                .bind(now)
                .bind(id)
                .bind(email)
                .bind(current)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(next)
                .bind(now)
                .bind(id)
                .bind(email)
                .bind(current)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to rotate refresh token")?;

        Ok(affected == 1)
    }

    async fn set_avatar(&self, id: i64, avatar: &str) -> Result<bool> {
        let now = Utc::now();
        let sql = "UPDATE users SET avatar = ?, updated_at = ? WHERE id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(avatar)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(avatar)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to set avatar")?;

        Ok(affected > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const USER_COLUMNS: &str = "id, first_name, last_name, email, password, refresh_token, avatar, status, created_at, updated_at";

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (first_name, last_name, email, password, refresh_token, avatar, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.refresh_token)
    .bind(&user.avatar)
    .bind(user.status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, email = ?, password = ?, avatar = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.avatar)
    .bind(user.status)
    .bind(user.updated_at)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    Ok(())
}

async fn list_users_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<(Vec<User>, i64)> {
    let pattern = params.like_pattern();

    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM users
        WHERE ? IS NULL
           OR first_name LIKE ? ESCAPE '\'
           OR last_name LIKE ? ESCAPE '\'
           OR email LIKE ? ESCAPE '\'
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        USER_COLUMNS
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user_sqlite).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM users
        WHERE ? IS NULL
           OR first_name LIKE ? ESCAPE '\'
           OR last_name LIKE ? ESCAPE '\'
           OR email LIKE ? ESCAPE '\'
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await
    .context("Failed to count users")?
    .try_get("count")?;

    Ok((users, total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        refresh_token: row.try_get("refresh_token")?,
        avatar: row.try_get("avatar")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (first_name, last_name, email, password, refresh_token, avatar, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.refresh_token)
    .bind(&user.avatar)
    .bind(user.status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET first_name = ?, last_name = ?, email = ?, password = ?, avatar = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.avatar)
    .bind(user.status)
    .bind(user.updated_at)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    Ok(())
}

async fn list_users_mysql(pool: &MySqlPool, params: &ListParams) -> Result<(Vec<User>, i64)> {
    let pattern = params.like_pattern();

    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM users
        WHERE ? IS NULL OR first_name LIKE ? OR last_name LIKE ? OR email LIKE ?
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        USER_COLUMNS
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user_mysql).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM users
        WHERE ? IS NULL OR first_name LIKE ? OR last_name LIKE ? OR email LIKE ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await
    .context("Failed to count users")?
    .try_get("count")?;

    Ok((users, total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        refresh_token: row.try_get("refresh_token")?,
        avatar: row.try_get("avatar")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn user(first: &str, last: &str, email: &str) -> User {
        User::new(
            first.to_string(),
            last.to_string(),
            email.to_string(),
            "hash".to_string(),
            None,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;

        let created = repo
            .create(&user("Ada", "Lovelace", "ada@example.com"))
            .await
            .expect("Failed to create user");
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.expect("get").expect("exists");
        assert_eq!(by_id.first_name, "Ada");
        assert_eq!(by_id.last_name, "Lovelace");
        assert_eq!(by_id.email, "ada@example.com");
        assert_eq!(by_id.password_hash, "hash");
        assert_eq!(by_id.status, 1);

        let by_email = repo
            .get_by_email("ada@example.com")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(by_email.id, created.id);
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id(999).await.expect("get").is_none());
        assert!(repo.get_by_email("nobody@example.com").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let repo = setup_test_repo().await;
        repo.create(&user("A", "A", "dup@example.com")).await.expect("first");

        let err = repo
            .create(&user("B", "B", "dup@example.com"))
            .await
            .expect_err("duplicate should fail");
        assert!(is_unique_violation(&err));

        let (_, total) = repo.list(&ListParams::default()).await.expect("list");
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_update_user() {
        let repo = setup_test_repo().await;
        let mut created = repo.create(&user("A", "B", "a@example.com")).await.expect("create");

        created.first_name = "Changed".to_string();
        created.status = 0;
        repo.update(&created).await.expect("update");

        let fetched = repo.get_by_id(created.id).await.expect("get").expect("exists");
        assert_eq!(fetched.first_name, "Changed");
        assert_eq!(fetched.status, 0);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let repo = setup_test_repo().await;
        let created = repo.create(&user("A", "B", "a@example.com")).await.expect("create");

        assert!(repo.delete(created.id).await.expect("delete"));
        assert!(!repo.delete(created.id).await.expect("delete again"));
        assert!(repo.get_by_id(created.id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_rotation_is_compare_and_swap() {
        let repo = setup_test_repo().await;
        let created = repo.create(&user("A", "B", "a@example.com")).await.expect("create");

        repo.set_refresh_token(created.id, Some("first")).await.expect("set");
        assert!(!repo
            .rotate_refresh_token(created.id, "other@example.com", "first", "second")
            .await
            .expect("wrong email"));
        assert!(repo
            .rotate_refresh_token(created.id, "a@example.com", "first", "second")
            .await
            .expect("rotate"));
        assert!(!repo
            .rotate_refresh_token(created.id, "a@example.com", "first", "third")
            .await
            .expect("stale"));

        let fetched = repo.get_by_id(created.id).await.expect("get").expect("exists");
        assert_eq!(fetched.refresh_token.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_set_avatar() {
        let repo = setup_test_repo().await;
        let created = repo.create(&user("A", "B", "a@example.com")).await.expect("create");

        assert!(repo.set_avatar(created.id, "uploads/avatar/a.png").await.expect("set"));
        assert!(!repo.set_avatar(999, "uploads/avatar/b.png").await.expect("missing"));

        let fetched = repo.get_by_id(created.id).await.expect("get").expect("exists");
        assert_eq!(fetched.avatar.as_deref(), Some("uploads/avatar/a.png"));
    }

    #[tokio::test]
    async fn test_list_users_search_and_order() {
        let repo = setup_test_repo().await;
        repo.create(&user("Alice", "Smith", "alice@example.com")).await.expect("create");
        repo.create(&user("Bob", "Jones", "bob@example.com")).await.expect("create");
        repo.create(&user("Carol", "Smithers", "carol@sample.org")).await.expect("create");

        let (all, total) = repo.list(&ListParams::default()).await.expect("list");
        assert_eq!(total, 3);
        assert_eq!(all[0].first_name, "Carol");
        assert_eq!(all[2].first_name, "Alice");

        let (smiths, total) = repo
            .list(&ListParams::new(1, 10).with_search("smith"))
            .await
            .expect("list");
        assert_eq!(total, 2);
        assert!(smiths.iter().all(|u| u.last_name.starts_with("Smith")));

        let (by_email, total) = repo
            .list(&ListParams::new(1, 10).with_search("sample.org"))
            .await
            .expect("list");
        assert_eq!(total, 1);
        assert_eq!(by_email[0].first_name, "Carol");
    }

    #[tokio::test]
    async fn test_list_users_pages() {
        let repo = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&user("U", &i.to_string(), &format!("u{}@example.com", i)))
                .await
                .expect("create");
        }

        let (page3, total) = repo.list(&ListParams::new(3, 2)).await.expect("list");
        assert_eq!(total, 5);
        assert_eq!(page3.len(), 1);

        let (page4, _) = repo.list(&ListParams::new(4, 2)).await.expect("list");
        assert!(page4.is_empty());
    }
}
