//! Post model
//!
//! A post always belongs to a user and optionally to a category. Reads join
//! both so responses carry the owner and category summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::CategorySummary;
use super::user::{UserSummary, STATUS_ACTIVE};

/// Post entity as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Stored thumbnail path, relative to the server root
    pub thumbnail: String,
    pub status: i32,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owner
    pub user: UserSummary,
    pub category: Option<CategorySummary>,
}

/// Row to insert for a new post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub status: i32,
    pub user_id: i64,
    pub category_id: Option<i64>,
}

/// Input for creating a post; the owner comes from the authenticated caller
#[derive(Debug, Clone, Default)]
pub struct CreatePostInput {
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub status: Option<i32>,
    pub category_id: Option<i64>,
}

impl CreatePostInput {
    pub fn into_new_post(self, user_id: i64) -> NewPost {
        NewPost {
            title: self.title,
            description: self.description,
            thumbnail: self.thumbnail,
            status: self.status.unwrap_or(STATUS_ACTIVE),
            user_id,
            category_id: self.category_id,
        }
    }
}

/// Partial update for a post
#[derive(Debug, Clone, Default)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub status: Option<i32>,
    /// `Some(None)` detaches the post from its category
    pub category_id: Option<Option<i64>>,
}

impl UpdatePostInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.thumbnail.is_none()
            && self.status.is_none()
            && self.category_id.is_none()
    }

    /// Apply the provided fields onto `post`.
    /// The embedded category summary is refreshed by the caller when the id changes.
    pub fn merge_into(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(description) = self.description {
            post.description = description;
        }
        if let Some(thumbnail) = self.thumbnail {
            post.thumbnail = thumbnail;
        }
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(category_id) = self.category_id {
            post.category_id = category_id;
        }
    }
}
