//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories:
//! - Validating input and enforcing business rules
//! - Hashing passwords and signing tokens
//! - Shaping list results into the pagination envelope

pub mod auth;
pub mod category;
pub mod password;
pub mod post;
pub mod token;
pub mod user;

pub use auth::{AuthService, AuthServiceError, LoginInput, RefreshInput, RegisteredUser};
pub use category::{CategoryService, CategoryServiceError};
pub use password::{hash_password, verify_password};
pub use post::{PostService, PostServiceError};
pub use token::{Claims, TokenError, TokenKind, TokenPair, TokenService};
pub use user::{UserService, UserServiceError};
