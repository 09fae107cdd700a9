//! GraphQL transport end to end: the schema assembled from every service's
//! fragment, served at `/graphql`.

use axum::http::{Method, StatusCode};
use inkwell_api::ApiResult;
use inkwell_core::AuthUser;
use inkwell_test_utils::assertions::assert_len;
use inkwell_test_utils::fixtures;
use serde_json::{json, Value as JsonValue};

#[path = "support/app.rs"]
mod test_support;
use test_support::{send, test_app, TestResponse};

async fn graphql(router: &axum::Router, user: Option<&AuthUser>, query: &str) -> TestResponse {
    send(router, Method::POST, "/graphql", user, Some(json!({ "query": query }))).await
}

fn first_error_code(response: &TestResponse) -> Option<&str> {
    response.body["errors"][0]["extensions"]["code"].as_str()
}

#[tokio::test]
async fn test_create_then_query_posts() -> ApiResult<()> {
    let app = test_app().await?;
    let author = fixtures::author();

    let created = graphql(
        &app.router,
        Some(&author),
        r#"mutation { createPost(title: "Typed Words", content: "Body", tags: ["rust"]) { code slug author } }"#,
    )
    .await;
    assert_eq!(created.status, StatusCode::OK);
    assert!(created.body.get("errors").is_none(), "unexpected errors: {}", created.body);
    let post = &created.data()["createPost"];
    assert_eq!(post["slug"], "typed-words");
    assert_eq!(post["author"]["username"], "author");
    let code = post["code"].as_str().unwrap_or_default().to_string();

    let listed = graphql(&app.router, None, "{ posts { code title views } }").await;
    assert_len(&listed.data()["posts"], 1);
    assert_eq!(listed.data()["posts"][0]["code"], JsonValue::String(code.clone()));

    let single = graphql(&app.router, None, &format!(r#"{{ post(id: "{}") {{ title views }} }}"#, code)).await;
    assert_eq!(single.data()["post"]["title"], "Typed Words");
    assert_eq!(single.data()["post"]["views"], 1);
    Ok(())
}

#[tokio::test]
async fn test_errors_carry_codes_in_extensions() -> ApiResult<()> {
    let app = test_app().await?;

    let anonymous = graphql(
        &app.router,
        None,
        r#"mutation { createPost(title: "Nope", content: "x") { code } }"#,
    )
    .await;
    assert_eq!(first_error_code(&anonymous), Some("UNAUTHORIZED"));
    assert!(anonymous.body["errors"][0]["extensions"]["requestId"].is_string());

    let reader = fixtures::reader();
    let created = graphql(
        &app.router,
        Some(&fixtures::author()),
        r#"mutation { createPost(title: "Popular", content: "x") { code } }"#,
    )
    .await;
    let code = created.data()["createPost"]["code"].as_str().unwrap_or_default().to_string();
    let vote = format!(r#"mutation {{ votePost(id: "{}") {{ votes }} }}"#, code);

    let first = graphql(&app.router, Some(&reader), &vote).await;
    assert_eq!(first.data()["votePost"]["votes"], 1);
    let second = graphql(&app.router, Some(&reader), &vote).await;
    assert_eq!(first_error_code(&second), Some("ALREADY_VOTED"));
    Ok(())
}

#[tokio::test]
async fn test_lookup_by_slug_and_menu() -> ApiResult<()> {
    let app = test_app().await?;
    let admin = fixtures::admin();

    let tag = graphql(
        &app.router,
        Some(&admin),
        r#"mutation { createTag(name: "Rust", tag_id: "t1", slug: "rust") { code } }"#,
    )
    .await;
    assert!(tag.body.get("errors").is_none(), "unexpected errors: {}", tag.body);

    let found = graphql(&app.router, None, r#"{ tagBySlug(slug: "rust") { name } }"#).await;
    assert_eq!(found.data()["tagBySlug"]["name"], "Rust");

    let missing = graphql(&app.router, None, r#"{ tagBySlug(slug: "zig") { name } }"#).await;
    assert!(missing.data()["tagBySlug"].is_null());
    Ok(())
}

#[tokio::test]
async fn test_playground_is_served() -> ApiResult<()> {
    let app = test_app().await?;
    let response = send(&app.router, Method::GET, "/graphql/playground", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    Ok(())
}
