//! Database layer
//!
//! Supports SQLite (default, single file) and MySQL, selected by configuration.
//! The `DatabasePool` trait hides the backend; repositories match on
//! [`Backend`] to choose the SQL dialect.
//!
//! # Usage
//!
//! ```ignore
//! use quillpost::config::DatabaseConfig;
//! use quillpost::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, is_unique_violation, Backend, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};
