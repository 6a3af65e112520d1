#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use shopfront_api::auth::jwt::{generate_access_token, JwtConfig};
use shopfront_api::config::ServerConfig;
use shopfront_api::router::build_app_router;
use shopfront_api::state::AppState;
use shopfront_core::types::DbId;
use shopfront_persistence::MemoryLayoutStore;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// The full application over the given in-memory store.
pub fn build_test_app(store: Arc<MemoryLayoutStore>) -> Router {
    build_app_router(AppState {
        store,
        config: Arc::new(test_config()),
    })
}

/// A valid access token for `user_id`.
pub fn token_for(user_id: DbId) -> String {
    generate_access_token(user_id, "merchant", &test_config().jwt).unwrap()
}

/// A valid access token for `user_id` carrying `role`.
pub fn token_with_role(user_id: DbId, role: &str) -> String {
    generate_access_token(user_id, role, &test_config().jwt).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

fn json_request(method: Method, uri: &str, body: serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, json_request(Method::POST, uri, body, None)).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, json_request(Method::PUT, uri, body, None)).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    send(app, json_request(Method::PUT, uri, body, Some(token))).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
