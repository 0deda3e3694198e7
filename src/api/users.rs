//! User API endpoints
//!
//! All routes require an access token.
//! - GET /users, GET /users/{id}
//! - POST /users
//! - PUT /users/{id}, DELETE /users/{id}
//! - POST /users/upload-avatar - Replace the caller's avatar (multipart field `avatar`)

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthUser};
use crate::api::upload::{self, UploadFolder};
use crate::models::{CreateUserInput, ListParams, ListQuery, Paginated, UpdateUserInput, User};
use crate::services::UserServiceError;

/// Multipart field carrying the avatar image
const AVATAR_FIELD: &str = "avatar";

/// Build the users router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/upload-avatar", post(upload_avatar))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
}

/// GET /users
async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    let params = ListParams::from(query);
    Ok(Json(state.user_service.find_all(&params).await?))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.find_one(id).await?))
}

/// POST /users
async fn create_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.user_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /users/{id}
async fn update_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.update(id, input).await?))
}

/// DELETE /users/{id}
async fn delete_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /users/upload-avatar
///
/// Stores the `avatar` file and points the caller's avatar at it.
async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<User>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }

        let stored = upload::store_field(&state.upload_config, UploadFolder::Avatar, field).await?;

        return match state.user_service.set_avatar(user.id, &stored.relative_path).await {
            Ok(updated) => Ok(Json(updated)),
            Err(e) => {
                upload::discard(&stored).await;
                Err(match e {
                    UserServiceError::NotFound(_) => {
                        ApiError::unauthorized("Account no longer exists")
                    }
                    other => other.into(),
                })
            }
        };
    }

    Err(ApiError::bad_request("No avatar file provided"))
}
