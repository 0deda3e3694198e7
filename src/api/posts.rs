//! Post API endpoints
//!
//! - GET /posts - Public paginated list
//! - GET /posts/{id} - Single post (auth)
//! - POST /posts - Create from a multipart form with a `thumbnail` file (auth)
//! - PUT /posts/{id} - Partial update from a multipart form (auth)
//! - DELETE /posts/{id} (auth)

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthUser};
use crate::api::upload::{self, StoredFile, UploadFolder};
use crate::config::UploadConfig;
use crate::models::{CreatePostInput, ListParams, ListQuery, Paginated, Post, UpdatePostInput};

/// Multipart field carrying the thumbnail image
const THUMBNAIL_FIELD: &str = "thumbnail";

/// Build the posts router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/{id}", get(get_post).put(update_post).delete(delete_post))
}

/// GET /posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Post>>, ApiError> {
    let params = ListParams::from(query);
    Ok(Json(state.post_service.find_all(&params).await?))
}

/// GET /posts/{id}
async fn get_post(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.post_service.find_one(id).await?))
}

/// POST /posts
///
/// Fields: `title`, `description`, optional `status` and `category_id`, and the
/// required `thumbnail` file. The caller becomes the owner.
async fn create_post(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let form = read_post_form(&state.upload_config, &mut multipart).await?;

    let (input, thumbnail) = match form.into_create_input() {
        Ok(parts) => parts,
        Err((e, thumbnail)) => {
            if let Some(stored) = thumbnail {
                upload::discard(&stored).await;
            }
            return Err(e);
        }
    };

    match state.post_service.create(user.id, input).await {
        Ok(post) => Ok((StatusCode::CREATED, Json(post))),
        Err(e) => {
            upload::discard(&thumbnail).await;
            Err(e.into())
        }
    }
}

/// PUT /posts/{id}
///
/// Every field is optional. An empty `category_id` detaches the post from its
/// category.
async fn update_post(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<Post>, ApiError> {
    let form = read_post_form(&state.upload_config, &mut multipart).await?;
    let thumbnail = form.thumbnail.clone();

    match state.post_service.update(id, form.into_update_input()).await {
        Ok(post) => Ok(Json(post)),
        Err(e) => {
            if let Some(stored) = thumbnail {
                upload::discard(&stored).await;
            }
            Err(e.into())
        }
    }
}

/// DELETE /posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Multipart form
// ============================================================================

/// Fields collected from a post form
#[derive(Debug, Default)]
struct PostForm {
    title: Option<String>,
    description: Option<String>,
    status: Option<i32>,
    /// `Some(None)` when the field was sent empty
    category_id: Option<Option<i64>>,
    thumbnail: Option<StoredFile>,
}

impl PostForm {
    /// The stored thumbnail is handed back either way so the caller can discard
    /// it if the post is never written.
    fn into_create_input(
        self,
    ) -> Result<(CreatePostInput, StoredFile), (ApiError, Option<StoredFile>)> {
        let Some(title) = self.title else {
            return Err((ApiError::validation_error("Title is required"), self.thumbnail));
        };
        let Some(description) = self.description else {
            return Err((ApiError::validation_error("Description is required"), self.thumbnail));
        };
        let Some(thumbnail) = self.thumbnail else {
            return Err((ApiError::bad_request("Thumbnail file is required"), None));
        };

        let input = CreatePostInput {
            title,
            description,
            thumbnail: thumbnail.relative_path.clone(),
            status: self.status,
            category_id: self.category_id.flatten(),
        };
        Ok((input, thumbnail))
    }

    fn into_update_input(self) -> UpdatePostInput {
        UpdatePostInput {
            title: self.title,
            description: self.description,
            thumbnail: self.thumbnail.map(|stored| stored.relative_path),
            status: self.status,
            category_id: self.category_id,
        }
    }
}

/// Read all fields, discarding any stored thumbnail if the form turns out invalid
async fn read_post_form(
    config: &UploadConfig,
    multipart: &mut Multipart,
) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();

    if let Err(e) = fill_post_form(config, multipart, &mut form).await {
        if let Some(stored) = &form.thumbnail {
            upload::discard(stored).await;
        }
        return Err(e);
    }

    Ok(form)
}

async fn fill_post_form(
    config: &UploadConfig,
    multipart: &mut Multipart,
    form: &mut PostForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == THUMBNAIL_FIELD {
            if form.thumbnail.is_some() {
                return Err(ApiError::bad_request("Only one thumbnail file is allowed"));
            }
            form.thumbnail = Some(upload::store_field(config, UploadFolder::Post, field).await?);
            continue;
        }

        let known = matches!(name.as_str(), "title" | "description" | "status" | "category_id");
        if !known {
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read field '{}': {}", name, e)))?;

        match name.as_str() {
            "title" => form.title = Some(value),
            "description" => form.description = Some(value),
            "status" => form.status = Some(parse_number(&name, &value)?),
            "category_id" => {
                let value = value.trim();
                form.category_id = Some(if value.is_empty() {
                    None
                } else {
                    Some(parse_number(&name, value)?)
                });
            }
            _ => {}
        }
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Field '{}' must be a number", field)))
}
