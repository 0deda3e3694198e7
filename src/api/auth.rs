//! Authentication API endpoints
//!
//! - POST /auth/register - Create an account and receive a token pair
//! - POST /auth/login - Exchange credentials for a token pair
//! - POST /auth/refresh-token - Rotate a refresh token

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::CreateUserInput;
use crate::services::{LoginInput, RefreshInput, RegisteredUser, TokenPair};

/// Build the auth router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

/// POST /auth/register
async fn register(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    let registered = state.auth_service.register(input).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<TokenPair>, ApiError> {
    Ok(Json(state.auth_service.login(input).await?))
}

/// POST /auth/refresh-token
async fn refresh_token(
    State(state): State<AppState>,
    Json(input): Json<RefreshInput>,
) -> Result<Json<TokenPair>, ApiError> {
    Ok(Json(state.auth_service.refresh(&input.refresh_token).await?))
}
