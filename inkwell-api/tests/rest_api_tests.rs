//! End-to-end REST tests driving the composed router with `oneshot`.

use axum::http::{Method, StatusCode};
use inkwell_api::constants::REQUEST_ID_HEADER;
use inkwell_api::ws::handle_frame;
use inkwell_api::ApiResult;
use inkwell_test_utils::assertions::assert_len;
use inkwell_test_utils::fixtures;
use serde_json::{json, Value as JsonValue};

#[path = "support/app.rs"]
mod test_support;
use test_support::{send, test_app};

async fn create_post(router: &axum::Router, title: &str, tags: JsonValue) -> String {
    let response = send(
        router,
        Method::POST,
        "/api/hexoposts",
        Some(&fixtures::author()),
        Some(json!({ "title": title, "content": "Some words", "tags": tags })),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "create failed: {}", response.body);
    response.data()["code"]
        .as_str()
        .expect("created post has a code")
        .to_string()
}

#[tokio::test]
async fn test_create_and_get_post() -> ApiResult<()> {
    let app = test_app().await?;
    let code = create_post(&app.router, "Hello World", json!([])).await;

    let response = send(&app.router, Method::GET, &format!("/api/hexoposts/{}", code), None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers.contains_key(REQUEST_ID_HEADER));
    let post = response.data();
    assert_eq!(post["title"], "Hello World");
    assert_eq!(post["slug"], "hello-world");
    assert_eq!(post["views"], 1);
    assert!(post.get("_id").is_none());
    assert_eq!(post["author"]["username"], "author");
    assert_eq!(post["author"]["code"], json!(fixtures::author().code));

    // Versioned alias reaches the same action; views keep counting.
    let response = send(&app.router, Method::GET, &format!("/api/v1/hexoposts/{}", code), None, None).await;
    assert_eq!(response.data()["views"], 2);
    Ok(())
}

#[tokio::test]
async fn test_create_requires_login_and_valid_input() -> ApiResult<()> {
    let app = test_app().await?;

    let anonymous = send(
        &app.router,
        Method::POST,
        "/api/hexoposts",
        None,
        Some(json!({ "title": "x", "content": "y" })),
    )
    .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.error_code(), Some("UNAUTHORIZED"));

    let invalid = send(
        &app.router,
        Method::POST,
        "/api/hexoposts",
        Some(&fixtures::reader()),
        Some(json!({ "title": "   ", "tags": "rust" })),
    )
    .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.error_code(), Some("VALIDATION_FAILED"));
    let params: Vec<&str> = invalid.body["error"]["details"]
        .as_array()
        .map(|errors| errors.iter().filter_map(|e| e["param"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(params, vec!["title", "content", "tags"]);
    Ok(())
}

#[tokio::test]
async fn test_owner_permission_blocks_other_users() -> ApiResult<()> {
    let app = test_app().await?;
    let code = create_post(&app.router, "Mine", json!([])).await;
    let uri = format!("/api/hexoposts/{}", code);

    let foreign = send(
        &app.router,
        Method::PUT,
        &uri,
        Some(&fixtures::reader()),
        Some(json!({ "title": "Hijacked" })),
    )
    .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let unchanged = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(unchanged.data()["title"], "Mine");

    let own = send(
        &app.router,
        Method::PATCH,
        &uri,
        Some(&fixtures::author()),
        Some(json!({ "title": "Still mine" })),
    )
    .await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.data()["title"], "Still mine");

    let admin = send(&app.router, Method::DELETE, &uri, Some(&fixtures::admin()), None).await;
    assert_eq!(admin.status, StatusCode::OK);

    let gone = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
    assert_eq!(gone.error_code(), Some("MODEL_NOT_FOUND"));
    Ok(())
}

#[tokio::test]
async fn test_voting_twice_conflicts() -> ApiResult<()> {
    let app = test_app().await?;
    let code = create_post(&app.router, "Vote for me", json!([])).await;
    let vote = format!("/api/hexoposts/{}/vote", code);
    let reader = fixtures::reader();

    let first = send(&app.router, Method::POST, &vote, Some(&reader), None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.data()["votes"], 1);
    assert_eq!(first.data()["voters"][0]["username"], "reader");

    let second = send(&app.router, Method::GET, &vote, Some(&reader), None).await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.error_code(), Some("ALREADY_VOTED"));

    let post = send(&app.router, Method::GET, &format!("/api/hexoposts/{}", code), None, None).await;
    assert_eq!(post.data()["votes"], 1);

    let unvote = format!("/api/hexoposts/{}/unvote", code);
    let undone = send(&app.router, Method::POST, &unvote, Some(&reader), None).await;
    assert_eq!(undone.data()["votes"], 0);
    let again = send(&app.router, Method::POST, &unvote, Some(&reader), None).await;
    assert_eq!(again.error_code(), Some("NOT_VOTED_YET"));
    Ok(())
}

#[tokio::test]
async fn test_named_actions_are_not_shadowed_by_id_routes() -> ApiResult<()> {
    let app = test_app().await?;
    create_post(&app.router, "Counted", json!([])).await;

    let count = send(&app.router, Method::GET, "/api/hexoposts/pageCount?limit=1", None, None).await;
    assert_eq!(count.status, StatusCode::OK);
    assert_eq!(count.data()["pages"], 1);

    // Atomic actions have no collection-level route: this is `get` with id "vote".
    let vote = send(&app.router, Method::GET, "/api/hexoposts/vote", Some(&fixtures::reader()), None).await;
    assert_eq!(vote.status, StatusCode::NOT_FOUND);
    assert_eq!(vote.error_code(), Some("MODEL_NOT_FOUND"));
    Ok(())
}

#[tokio::test]
async fn test_tags_populate_by_filter_with_raw_fallback() -> ApiResult<()> {
    let app = test_app().await?;
    let admin = fixtures::admin();
    let tag = send(
        &app.router,
        Method::POST,
        "/api/tags",
        Some(&admin),
        Some(json!({ "name": "Rust", "tag_id": "t1", "slug": "rust" })),
    )
    .await;
    assert_eq!(tag.status, StatusCode::OK);

    let partial = create_post(&app.router, "Partial", json!(["t1", "t2"])).await;
    let unknown = create_post(&app.router, "Unknown", json!(["t3", "t4"])).await;

    let partial = send(&app.router, Method::GET, &format!("/api/hexoposts/{}", partial), None, None).await;
    assert_len(&partial.data()["tags"], 1);
    assert_eq!(partial.data()["tags"][0]["name"], "Rust");

    let unknown = send(&app.router, Method::GET, &format!("/api/hexoposts/{}", unknown), None, None).await;
    assert_eq!(unknown.data()["tags"], json!(["t3", "t4"]));
    Ok(())
}

#[tokio::test]
async fn test_find_filters_and_paging() -> ApiResult<()> {
    let app = test_app().await?;
    for title in ["One", "Two", "Three"] {
        create_post(&app.router, title, json!([])).await;
    }
    let admin = fixtures::admin();
    send(
        &app.router,
        Method::POST,
        "/api/hexoposts",
        Some(&admin),
        Some(json!({ "title": "By admin", "content": "x" })),
    )
    .await;

    let all = send(&app.router, Method::GET, "/api/hexoposts", None, None).await;
    assert_len(all.data(), 4);
    assert_eq!(all.data()[0]["title"], "By admin");

    let mine = send(&app.router, Method::GET, "/api/hexoposts?filter=my", Some(&admin), None).await;
    assert_len(mine.data(), 1);

    let by_author = send(
        &app.router,
        Method::GET,
        &format!("/api/hexoposts?author={}", fixtures::author().code),
        None,
        None,
    )
    .await;
    assert_len(by_author.data(), 3);

    let page = send(&app.router, Method::GET, "/api/hexoposts/pages?limit=2&offset=2", None, None).await;
    assert_len(page.data(), 2);

    let slug = send(&app.router, Method::POST, "/api/hexoposts/find", None, Some(json!({ "slug": "two" }))).await;
    assert_len(slug.data(), 1);
    Ok(())
}

#[tokio::test]
async fn test_query_string_filters_typed_fields_and_shares_cache_with_sockets() -> ApiResult<()> {
    let app = test_app().await?;
    let admin = fixtures::admin();
    for (title, published) in [("About", true), ("Draft", false)] {
        let created = send(
            &app.router,
            Method::POST,
            "/api/pages",
            Some(&admin),
            Some(json!({ "title": title, "content": "x", "order": 1, "published": published })),
        )
        .await;
        assert_eq!(created.status, StatusCode::OK, "create failed: {}", created.body);
    }

    let rest = send(&app.router, Method::GET, "/api/pages?published=true", None, None).await;
    assert_len(rest.data(), 1);
    assert_eq!(rest.data()[0]["title"], "About");

    let drafts = send(&app.router, Method::GET, "/api/pages?published=false", None, None).await;
    assert_len(drafts.data(), 1);
    assert_eq!(drafts.data()[0]["title"], "Draft");

    // Same canonical key as the REST call above: served from the cache,
    // with the same result.
    let hits_before = app.dispatcher.cache().stats().hits;
    let reply = handle_frame(
        &app.dispatcher,
        None,
        r#"{"service":"pages","action":"find","params":{"published":true},"seq":1}"#,
    )
    .await;
    assert_eq!(reply["data"], *rest.data());
    assert_eq!(app.dispatcher.cache().stats().hits, hits_before + 1);
    Ok(())
}

#[tokio::test]
async fn test_per_user_cache_does_not_leak() -> ApiResult<()> {
    let app = test_app().await?;
    create_post(&app.router, "Author post", json!([])).await;

    let author_view = send(&app.router, Method::GET, "/api/hexoposts?filter=my", Some(&fixtures::author()), None).await;
    assert_len(author_view.data(), 1);

    let reader_view = send(&app.router, Method::GET, "/api/hexoposts?filter=my", Some(&fixtures::reader()), None).await;
    assert_len(reader_view.data(), 0);
    Ok(())
}

#[tokio::test]
async fn test_error_envelope_for_bad_body_and_unknown_code() -> ApiResult<()> {
    let app = test_app().await?;

    let response = send(&app.router, Method::GET, "/api/hexoposts/not-a-code", None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body["error"]["message"].is_string());

    let response = send(
        &app.router,
        Method::POST,
        "/api/hexoposts",
        Some(&fixtures::author()),
        Some(json!(["not", "an", "object"])),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("INVALID_INPUT"));
    Ok(())
}

#[tokio::test]
async fn test_health_and_metrics() -> ApiResult<()> {
    let app = test_app().await?;

    let live = send(&app.router, Method::GET, "/health/live", None, None).await;
    assert_eq!(live.status, StatusCode::OK);

    let ready = send(&app.router, Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body["details"]["services"], 5);

    let metrics = send(&app.router, Method::GET, "/metrics", None, None).await;
    assert_eq!(metrics.status, StatusCode::OK);
    Ok(())
}
