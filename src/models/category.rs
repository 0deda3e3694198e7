//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::STATUS_ACTIVE;

/// Category entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub status: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: String, description: String, status: Option<i32>) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            name,
            description,
            status: status.unwrap_or(STATUS_ACTIVE),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub status: Option<i32>,
}

/// Partial update for a category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<i32>,
}

impl UpdateCategoryInput {
    pub fn merge_into(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name;
        }
        if let Some(description) = self.description {
            category.description = description;
        }
        if let Some(status) = self.status {
            category.status = status;
        }
    }
}

/// Category summary embedded in post responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
}
