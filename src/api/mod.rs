//! API layer - HTTP handlers and routing
//!
//! Routes are mounted at the root:
//! - `/auth` - register, login, refresh-token
//! - `/users` - user CRUD and avatar upload
//! - `/posts` - post CRUD with thumbnail upload (listing is public)
//! - `/categories` - category CRUD
//! - `/health` - database ping
//! - `/uploads/*` - stored files, served read-only

pub mod auth;
pub mod categories;
pub mod middleware;
pub mod posts;
pub mod upload;
pub mod users;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthUser};

/// Room for multipart boundaries and text fields on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the API routes
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/posts", posts::router())
        .nest("/categories", categories::router())
        .route("/health", get(health))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_allow_origin(cors_origin))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = usize::try_from(state.upload_config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .merge(build_api_router())
        .nest_service(
            &format!("/{}", upload::UPLOADS_URL_PREFIX),
            ServeDir::new(&state.upload_config.path),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; anything else must be a single valid origin
fn cors_allow_origin(origin: &str) -> AllowOrigin {
    if origin.trim() == "*" {
        return AllowOrigin::from(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            tracing::warn!("Invalid CORS origin '{}' ({}), allowing any origin", origin, e);
            AllowOrigin::from(Any)
        }
    }
}

/// GET /health
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .pool
        .ping()
        .await
        .map_err(|e| ApiError::internal(&e))?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::UploadConfig;
    use crate::db::{create_test_pool, migrations};
    use crate::services::TokenService;

    const SECRET: &str = "router-test-secret-at-least-32-bytes-long";
    const BOUNDARY: &str = "quillpost-test-boundary";

    async fn test_app() -> (Router, TempDir) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let uploads = tempfile::tempdir().expect("tempdir");
        let upload_config = UploadConfig {
            path: uploads.path().to_path_buf(),
            ..UploadConfig::default()
        };
        let tokens = Arc::new(TokenService::new(SECRET, 3600, 7 * 24 * 3600));
        let state = AppState::new(pool, tokens, upload_config);

        (build_router(state, "*"), uploads)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("request failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn multipart_request(uri: &str, token: &str, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    /// Multipart create-post request with a small jpeg thumbnail
    fn post_form_request(token: &str, title: &str) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in [("title", title), ("description", "World")] {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"thumbnail\"; filename=\"cover.jpg\"\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"jpeg-bytes");
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/posts")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    }

    async fn register(app: &Router, email: &str) -> Value {
        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/auth/register",
                None,
                json!({
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "email": email,
                    "password": "engine-notes",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body
    }

    fn files_in(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _uploads) = test_app().await;
        let (status, body) = send(&app, get_request("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_returns_user_and_tokens() {
        let (app, _uploads) = test_app().await;
        let body = register(&app, "ada@example.com").await;

        assert_eq!(body["email"], "ada@example.com");
        assert!(body["access_token"].is_string());
        assert!(body["refresh_token"].is_string());
        assert!(body.get("password_hash").is_none());
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let (app, _uploads) = test_app().await;
        register(&app, "ada@example.com").await;

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/register",
                None,
                json!({"email": "ada@example.com", "password": "other"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_register_invalid_email() {
        let (app, _uploads) = test_app().await;
        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/register",
                None,
                json!({"email": "not-an-email", "password": "pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_login_and_bad_password() {
        let (app, _uploads) = test_app().await;
        register(&app, "ada@example.com").await;

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/login",
                None,
                json!({"email": "ada@example.com", "password": "engine-notes"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/login",
                None,
                json!({"email": "ada@example.com", "password": "wrong"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_guarded_route_requires_token() {
        let (app, _uploads) = test_app().await;

        let (status, body) = send(&app, get_request("/users", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, get_request("/users", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let (app, _uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let refresh = registered["refresh_token"].as_str().unwrap();

        let (status, _) = send(&app, get_request("/users", Some(refresh))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_users_envelope() {
        let (app, _uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        let (status, body) = send(&app, get_request("/users?page=1&items_per_page=10", Some(token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["currentPage"], 1);
        assert_eq!(body["last_page"], 1);
        assert!(body["next_page"].is_null());
        assert!(body["prev_page"].is_null());
        assert_eq!(body["data"][0]["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_posts_list_is_public() {
        let (app, _uploads) = test_app().await;
        let (status, body) = send(&app, get_request("/posts", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_refresh_rotation() {
        let (app, _uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let first = registered["refresh_token"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/refresh-token",
                None,
                json!({"refresh_token": first}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let second = body["refresh_token"].as_str().unwrap().to_string();
        assert_ne!(first, second);

        // The rotated-out token is dead.
        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/refresh-token",
                None,
                json!({"refresh_token": first}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_category_lifecycle() {
        let (app, _uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        let (status, created) = send(
            &app,
            json_request(
                Method::POST,
                "/categories",
                Some(token),
                json!({"name": "Rust", "description": "Systems"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();

        let (status, updated) = send(
            &app,
            json_request(
                Method::PUT,
                &format!("/categories/{}", id),
                Some(token),
                json!({"name": "Rustlang"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Rustlang");
        assert_eq!(updated["description"], "Systems");

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/categories/{}", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, get_request(&format!("/categories/{}", id), Some(token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_avatar_upload_stores_and_serves_file() {
        let (app, uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        let (status, user) = send(
            &app,
            multipart_request("/users/upload-avatar", token, "avatar", "me.png", b"png-bytes"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let avatar = user["avatar"].as_str().unwrap().to_string();
        assert!(avatar.starts_with("uploads/avatar/"));
        assert!(avatar.ends_with("-me.png"));
        assert_eq!(files_in(&uploads.path().join("avatar")), 1);

        let response = app
            .clone()
            .oneshot(get_request(&format!("/{}", avatar), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_avatar_upload_rejects_extension() {
        let (app, uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        let (status, body) = send(
            &app,
            multipart_request("/users/upload-avatar", token, "avatar", "notes.txt", b"hello"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(
            body["error"]["details"]["allowed_extensions"],
            json!(["png", "jpg", "jpeg"])
        );
        assert_eq!(files_in(&uploads.path().join("avatar")), 0);
    }

    #[tokio::test]
    async fn test_post_create_requires_thumbnail() {
        let (app, uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        let mut body = String::new();
        for (name, value) in [("title", "Hello"), ("description", "World")] {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/posts")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(files_in(&uploads.path().join("post")), 0);
    }

    #[tokio::test]
    async fn test_post_create_with_thumbnail() {
        let (app, uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        let request = post_form_request(token, "Hello");

        let (status, post) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", post);
        assert_eq!(post["title"], "Hello");
        assert_eq!(post["user"]["email"], "ada@example.com");
        assert!(post["category"].is_null());
        assert!(post["thumbnail"].as_str().unwrap().starts_with("uploads/post/"));
        assert_eq!(files_in(&uploads.path().join("post")), 1);

        let (status, listed) = send(&app, get_request("/posts", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["data"][0]["id"], post["id"]);
    }

    #[tokio::test]
    async fn test_avatar_size_limit_counts_streamed_bytes() {
        let (app, uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();
        let limit = UploadConfig::default().max_file_size as usize;

        let exact = vec![0u8; limit];
        let (status, body) = send(
            &app,
            multipart_request("/users/upload-avatar", token, "avatar", "big.png", &exact),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "upload at the limit failed: {}", body);
        assert_eq!(files_in(&uploads.path().join("avatar")), 1);

        let over = vec![0u8; limit + 1];
        let (status, body) = send(
            &app,
            multipart_request("/users/upload-avatar", token, "avatar", "bigger.png", &over),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["details"]["max_file_size"], limit as u64);
        assert_eq!(files_in(&uploads.path().join("avatar")), 1);
    }

    #[tokio::test]
    async fn test_posts_last_page_boundary() {
        let (app, _uploads) = test_app().await;
        let registered = register(&app, "ada@example.com").await;
        let token = registered["access_token"].as_str().unwrap();

        for n in 1..=5 {
            let (status, body) = send(&app, post_form_request(token, &format!("Post {}", n))).await;
            assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        }

        let (status, body) = send(&app, get_request("/posts?page=3&items_per_page=2", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["last_page"], 3);
        assert_eq!(body["currentPage"], 3);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["title"], "Post 1");
        assert!(body["next_page"].is_null());
        assert_eq!(body["prev_page"], 2);
    }
}
