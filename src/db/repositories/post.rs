//! Post repository
//!
//! Database operations for posts. Every read joins the owning user and
//! left-joins the category so a `Post` is always returned fully populated.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CategorySummary, ListParams, NewPost, Post, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post and return its ID
    async fn create(&self, post: &NewPost) -> Result<i64>;

    /// Get post by ID with owner and category
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Write title, description, thumbnail, status, category and updated_at
    async fn update(&self, post: &Post) -> Result<()>;

    /// Delete a post, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// List posts matching the search keyword on title or description
    async fn list(&self, params: &ListParams) -> Result<(Vec<Post>, i64)>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    /// Create a new SQLx post repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &NewPost) -> Result<i64> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO posts (title, description, thumbnail, status, user_id, category_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.description)
                .bind(&post.thumbnail)
                .bind(post.status)
                .bind(post.user_id)
                .bind(post.category_id)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.description)
                .bind(&post.thumbnail)
                .bind(post.status)
                .bind(post.user_id)
                .bind(post.category_id)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create post")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_post_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_post_by_id_mysql(pool, id).await,
        }
    }

    async fn update(&self, post: &Post) -> Result<()> {
        let sql = r#"
            UPDATE posts
            SET title = ?, description = ?, thumbnail = ?, status = ?, category_id = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.description)
                .bind(&post.thumbnail)
                .bind(post.status)
                .bind(post.category_id)
                .bind(post.updated_at)
                .bind(post.id)
                .execute(pool)
                .await
                .map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.description)
                .bind(&post.thumbnail)
                .bind(post.status)
                .bind(post.category_id)
                .bind(post.updated_at)
                .bind(post.id)
                .execute(pool)
                .await
                .map(|_| ()),
        }
        .context("Failed to update post")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM posts WHERE id = ?";
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
        .context("Failed to delete post")?;

        Ok(affected > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_posts_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_posts_mysql(pool, params).await,
        }
    }
}

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.description, p.thumbnail, p.status, p.category_id,
           p.created_at, p.updated_at,
           u.id AS user_id, u.first_name AS user_first_name, u.last_name AS user_last_name,
           u.email AS user_email, u.avatar AS user_avatar,
           c.name AS category_name
    FROM posts p
    INNER JOIN users u ON u.id = p.user_id
    LEFT JOIN categories c ON c.id = p.category_id
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("{} WHERE p.id = ?", POST_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.as_ref().map(row_to_post_sqlite).transpose()
}

async fn list_posts_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<(Vec<Post>, i64)> {
    let pattern = params.like_pattern();

    let rows = sqlx::query(&format!(
        r#"
        {}
        WHERE ? IS NULL
           OR p.title LIKE ? ESCAPE '\'
           OR p.description LIKE ? ESCAPE '\'
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ? OFFSET ?
        "#,
        POST_SELECT
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list posts")?;

    let posts = rows.iter().map(row_to_post_sqlite).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM posts p
        WHERE ? IS NULL
           OR p.title LIKE ? ESCAPE '\'
           OR p.description LIKE ? ESCAPE '\'
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await
    .context("Failed to count posts")?
    .try_get("count")?;

    Ok((posts, total))
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let category_id: Option<i64> = row.try_get("category_id")?;
    let category_name: Option<String> = row.try_get("category_name")?;

    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        thumbnail: row.try_get("thumbnail")?,
        status: row.try_get("status")?,
        category_id,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        user: UserSummary {
            id: row.try_get("user_id")?,
            first_name: row.try_get("user_first_name")?,
            last_name: row.try_get("user_last_name")?,
            email: row.try_get("user_email")?,
            avatar: row.try_get("user_avatar")?,
        },
        category: category_summary(category_id, category_name),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("{} WHERE p.id = ?", POST_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.as_ref().map(row_to_post_mysql).transpose()
}

async fn list_posts_mysql(pool: &MySqlPool, params: &ListParams) -> Result<(Vec<Post>, i64)> {
    let pattern = params.like_pattern();

    let rows = sqlx::query(&format!(
        r#"
        {}
        WHERE ? IS NULL OR p.title LIKE ? OR p.description LIKE ?
        ORDER BY p.created_at DESC, p.id DESC
        LIMIT ? OFFSET ?
        "#,
        POST_SELECT
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list posts")?;

    let posts = rows.iter().map(row_to_post_mysql).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM posts p
        WHERE ? IS NULL OR p.title LIKE ? OR p.description LIKE ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await
    .context("Failed to count posts")?
    .try_get("count")?;

    Ok((posts, total))
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    let category_id: Option<i64> = row.try_get("category_id")?;
    let category_name: Option<String> = row.try_get("category_name")?;

    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        thumbnail: row.try_get("thumbnail")?,
        status: row.try_get("status")?,
        category_id,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        user: UserSummary {
            id: row.try_get("user_id")?,
            first_name: row.try_get("user_first_name")?,
            last_name: row.try_get("user_last_name")?,
            email: row.try_get("user_email")?,
            avatar: row.try_get("user_avatar")?,
        },
        category: category_summary(category_id, category_name),
    })
}

fn category_summary(id: Option<i64>, name: Option<String>) -> Option<CategorySummary> {
    match (id, name) {
        (Some(id), Some(name)) => Some(CategorySummary { id, name }),
        _ => None,
    }
}
