//! Category repository
//!
//! Database operations for categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Write name, description, status and updated_at
    async fn update(&self, category: &Category) -> Result<()>;

    /// Delete a category, returning whether a row was removed.
    /// Posts in the category are detached, not deleted.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// List categories matching the search keyword on name or description
    async fn list(&self, params: &ListParams) -> Result<(Vec<Category>, i64)>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_category_sqlite(pool, category).await,
            Backend::Mysql(pool) => create_category_mysql(pool, category).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_category_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_category_by_id_mysql(pool, id).await,
        }
    }

    async fn update(&self, category: &Category) -> Result<()> {
        let sql = r#"
            UPDATE categories
            SET name = ?, description = ?, status = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.status)
                .bind(category.updated_at)
                .bind(category.id)
                .execute(pool)
                .await
                .map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.status)
                .bind(category.updated_at)
                .bind(category.id)
                .execute(pool)
                .await
                .map(|_| ()),
        }
        .context("Failed to update category")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM categories WHERE id = ?";
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
        .context("Failed to delete category")?;

        Ok(affected > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Category>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_categories_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_categories_mysql(pool, params).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, description, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.description)
    .bind(category.status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn get_category_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, description, status, created_at, updated_at
        FROM categories
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by ID")?;

    row.as_ref().map(row_to_category_sqlite).transpose()
}

async fn list_categories_sqlite(
    pool: &SqlitePool,
    params: &ListParams,
) -> Result<(Vec<Category>, i64)> {
    let pattern = params.like_pattern();

    let rows = sqlx::query(
        r#"
        SELECT id, name, description, status, created_at, updated_at
        FROM categories
        WHERE ? IS NULL
           OR name LIKE ? ESCAPE '\'
           OR description LIKE ? ESCAPE '\'
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    let categories = rows.iter().map(row_to_category_sqlite).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM categories
        WHERE ? IS NULL
           OR name LIKE ? ESCAPE '\'
           OR description LIKE ? ESCAPE '\'
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await
    .context("Failed to count categories")?
    .try_get("count")?;

    Ok((categories, total))
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, description, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.description)
    .bind(category.status)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..category.clone()
    })
}

async fn get_category_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, description, status, created_at, updated_at
        FROM categories
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get category by ID")?;

    row.as_ref().map(row_to_category_mysql).transpose()
}

async fn list_categories_mysql(
    pool: &MySqlPool,
    params: &ListParams,
) -> Result<(Vec<Category>, i64)> {
    let pattern = params.like_pattern();

    let rows = sqlx::query(
        r#"
        SELECT id, name, description, status, created_at, updated_at
        FROM categories
        WHERE ? IS NULL OR name LIKE ? OR description LIKE ?
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list categories")?;

    let categories = rows.iter().map(row_to_category_mysql).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM categories
        WHERE ? IS NULL OR name LIKE ? OR description LIKE ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await
    .context("Failed to count categories")?
    .try_get("count")?;

    Ok((categories, total))
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Category> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
