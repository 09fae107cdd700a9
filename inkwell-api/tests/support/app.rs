//! Shared setup for the integration suites: a fully wired application
//! over fresh in-memory collections, people seeded so their ids match the
//! `inkwell_test_utils::fixtures` users.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use inkwell_api::auth::{generate_jwt_token, JwtSecret};
use inkwell_api::services::PERSONS;
use inkwell_api::{build_app, ApiConfig, ApiResult, App, AuthConfig};
use inkwell_core::AuthUser;
use inkwell_test_utils::{fixtures, TEST_SALT};
use serde_json::Value as JsonValue;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-with-32-chars!";

pub fn test_api_config() -> ApiConfig {
    ApiConfig {
        id_salt: TEST_SALT.to_string(),
        environment: "test".to_string(),
        ..ApiConfig::default()
    }
}

pub fn test_auth_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.jwt_secret =
        JwtSecret::new(TEST_JWT_SECRET.to_string()).expect("test secret should be valid");
    config
}

/// Application with `reader`, `author` and `admin` stored as persons 1..=3.
pub async fn test_app() -> ApiResult<App> {
    let app = build_app(test_api_config(), test_auth_config()).await?;
    let persons = app.dispatcher.registry().get(PERSONS)?.collection.clone();
    fixtures::insert_all(persons.as_ref(), fixtures::person_docs()).await?;
    Ok(app)
}

pub fn bearer(user: &AuthUser) -> String {
    let token = generate_jwt_token(&test_auth_config(), &user.code, &user.username, user.roles.clone())
        .expect("token generation should succeed");
    format!("Bearer {}", token)
}

/// Response status, headers and parsed JSON body.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: JsonValue,
}

impl TestResponse {
    pub fn data(&self) -> &JsonValue {
        &self.body["data"]
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&AuthUser>,
    body: Option<JsonValue>,
) -> TestResponse {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header("authorization", bearer(user));
    }
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).expect("request should build"))
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body should be readable");
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };

    TestResponse { status, headers, body }
}
