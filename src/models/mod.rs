//! Data models
//!
//! Database entities (User, Post, Category), their create/update inputs, and
//! the list query and pagination envelope shared by the list endpoints.

mod category;
mod pagination;
mod post;
mod user;

pub use category::{Category, CategorySummary, CreateCategoryInput, UpdateCategoryInput};
pub use pagination::{
    last_page, ListParams, ListQuery, Paginated, DEFAULT_ITEMS_PER_PAGE, DEFAULT_PAGE,
};
pub use post::{CreatePostInput, NewPost, Post, UpdatePostInput};
pub use user::{CreateUserInput, UpdateUserInput, User, UserSummary, STATUS_ACTIVE};
