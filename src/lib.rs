//! Quillpost - A blog backend with token authentication
//!
//! Users, posts and categories over a JSON API, with avatar and thumbnail
//! uploads and paginated listings.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
