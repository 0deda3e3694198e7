//! Category API endpoints
//!
//! All routes require an access token.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthUser};
use crate::models::{
    Category, CreateCategoryInput, ListParams, ListQuery, Paginated, UpdateCategoryInput,
};

/// Build the categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/{id}",
            get(get_category).put(update_category).delete(delete_category),
        )
}

/// GET /categories
async fn list_categories(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Category>>, ApiError> {
    let params = ListParams::from(query);
    Ok(Json(state.category_service.find_all(&params).await?))
}

/// GET /categories/{id}
async fn get_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.find_one(id).await?))
}

/// POST /categories
async fn create_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /categories/{id}
async fn update_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, input).await?))
}

/// DELETE /categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
