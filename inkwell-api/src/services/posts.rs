//! Posts
//!
//! Mounted at `hexoposts`. Besides the REST idioms it carries the client's
//! paging pair (`pages`, `pageCount`), the atomic `content` lookup and the
//! atomic `vote` / `unvote` pair.
//!
//! Stored posts keep internal keys in `author` and `voters` and external
//! keys (`tag_id` / `slug`, `category_id` / `slug`) in `tags` and
//! `categories`; all four are populated on the way out.

use std::sync::Arc;

use inkwell_core::{Document, Filter, Permission, SortKey, Update, ID_FIELD};
use inkwell_storage::{Collection, Query, CREATED_AT};
use serde_json::{json, Value as JsonValue};

use crate::context::Context;
use crate::crud;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::events::ChangeVerb;
use crate::routes::graphql::GraphqlFragment;
use crate::service::{handler, ActionDefinition, ActionReply, PopulateRule, ServiceDefinition};
use crate::slug::{slug_if_missing, slugify};

use super::{CATEGORIES, PERSONS, POSTS, TAGS};

const NAMESPACE: &str = "hexoposts";

/// Fields a caller may set on create and update.
const WRITABLE: &[&str] = &["title", "content", "excerpt", "tags", "categories", "published"];

// ============================================================================
// QUERIES
// ============================================================================

/// Insertion order breaks ties between posts stamped in the same millisecond.
fn newest_first() -> Vec<SortKey> {
    vec![SortKey::desc(CREATED_AT), SortKey::desc(ID_FIELD)]
}

/// Filter built from `filter=my`, `author`, `slug`, `tag` and `category`.
fn listing_filter(ctx: &Context) -> ApiResult<Filter> {
    let mut filter = Filter::All;

    if ctx.param_str("filter") == Some("my") {
        let user = ctx.require_user()?;
        filter = filter.and(Filter::eq("author", user.id));
    }
    if let Some(author) = ctx.param_str("author") {
        let id = ctx.sibling(PERSONS)?.decode_id(author)?;
        filter = filter.and(Filter::eq("author", id));
    }
    if let Some(slug) = ctx.param_str("slug") {
        filter = filter.and(Filter::eq("slug", slug));
    }
    if let Some(tag) = ctx.param_str("tag") {
        filter = filter.and(Filter::Contains("tags".to_string(), tag.into()));
    }
    if let Some(category) = ctx.param_str("category") {
        filter = filter.and(Filter::Contains("categories".to_string(), category.into()));
    }
    Ok(filter)
}

/// Caller-dependent listing, so cached per caller.
fn find() -> ActionDefinition {
    ActionDefinition::new(
        "find",
        handler(|ctx: Context| async move {
            let query = Query::filtered(listing_filter(&ctx)?).sort(newest_first());
            let posts = ctx.collection().find(&ctx.query_page_sort(query)).await?;
            Ok(ActionReply::models(posts))
        }),
    )
    .permission(Permission::Public)
    .cached_per_user()
}

/// One page of published posts for the client's pager.
fn pages() -> ActionDefinition {
    ActionDefinition::new(
        "pages",
        handler(|ctx: Context| async move {
            let query = Query::filtered(Filter::eq("published", true)).sort(newest_first());
            let posts = ctx.collection().find(&ctx.query_page_sort(query)).await?;
            Ok(ActionReply::models(posts))
        }),
    )
    .permission(Permission::Public)
    .cached()
}

/// Number of pages of published posts at the requested page size.
fn page_count() -> ActionDefinition {
    ActionDefinition::new(
        "pageCount",
        handler(|ctx: Context| async move {
            let limit = ctx.config().clamp_page_size(ctx.param_usize("limit"));
            let total = ctx.collection().count(&Filter::eq("published", true)).await?;
            let limit = limit.max(1) as u64;
            Ok(ActionReply::json(json!({
                "total": total,
                "limit": limit,
                "pages": total.div_ceil(limit),
            })))
        }),
    )
    .permission(Permission::Public)
    .cached()
}

/// Body only, for lazy loading in the client.
fn content() -> ActionDefinition {
    ActionDefinition::new(
        "content",
        handler(|ctx: Context| async move {
            let post = ctx.assert_model_exists("Post not found")?;
            Ok(ActionReply::json(json!({
                "code": ctx.code_param(),
                "content": post.get("content").cloned().unwrap_or(JsonValue::Null),
            })))
        }),
    )
    .permission(Permission::Public)
    .atomic()
}

/// Counts a view, so never cached.
fn get() -> ActionDefinition {
    ActionDefinition::new(
        "get",
        handler(|ctx: Context| async move {
            let id = ctx.require_model_id("Post not found")?;
            let post = ctx
                .collection()
                .update_by_id(id, &Filter::All, &Update::new().inc("views", 1))
                .await?
                .ok_or_else(|| ApiError::model_not_found("Post not found"))?;
            Ok(ActionReply::model(post))
        }),
    )
    .permission(Permission::Public)
}

// ============================================================================
// MUTATIONS
// ============================================================================

fn validate_post(ctx: &mut Context, required: bool) -> ApiResult<()> {
    for field in ["title", "content"] {
        if required || ctx.has_param(field) {
            ctx.validate_param(field)
                .trim()
                .is_string("must be a string")
                .not_empty("is required");
        }
    }
    for field in ["tags", "categories"] {
        let ok = match ctx.param(field) {
            None => true,
            Some(JsonValue::Array(items)) => items.iter().all(JsonValue::is_string),
            Some(_) => false,
        };
        if !ok {
            ctx.validation_errors
                .push(inkwell_core::ValidationError::new(field, "must be a list of strings"));
        }
    }
    if ctx.has_validation_errors() {
        return Err(ctx.error_bad_request(ErrorCode::ValidationFailed, "Invalid post"));
    }
    Ok(())
}

fn copy_writable(ctx: &Context, doc: &mut Document) {
    for field in WRITABLE {
        if let Some(value) = ctx.param(field) {
            doc.insert(field.to_string(), value.clone());
        }
    }
}

fn create() -> ActionDefinition {
    ActionDefinition::new(
        "create",
        handler(|mut ctx: Context| async move {
            validate_post(&mut ctx, true)?;
            let author = ctx.require_user()?.id;

            let mut doc = Document::new();
            copy_writable(&ctx, &mut doc);
            if let Some(slug) = slug_if_missing(ctx.param_str("title"), ctx.param_str("slug")) {
                doc.insert("slug".to_string(), slug.into());
            }
            doc.insert("author".to_string(), author.into());
            doc.entry("tags").or_insert_with(|| json!([]));
            doc.entry("categories").or_insert_with(|| json!([]));
            doc.entry("published").or_insert(JsonValue::Bool(true));
            doc.insert("votes".to_string(), 0.into());
            doc.insert("voters".to_string(), json!([]));
            doc.insert("views".to_string(), 0.into());

            let post = ctx.collection().insert(doc).await?;
            tracing::info!(request_id = %ctx.id, author = %ctx.require_user()?.code, "Post created");
            Ok(ActionReply::model(post).notify(ChangeVerb::Created))
        }),
    )
    .permission(Permission::LoggedIn)
}

fn update() -> ActionDefinition {
    ActionDefinition::new(
        "update",
        handler(|mut ctx: Context| async move {
            validate_post(&mut ctx, false)?;
            let mut post = ctx.assert_model_exists("Post not found")?.clone();
            copy_writable(&ctx, &mut post);
            if let Some(slug) = ctx.param_str("slug").map(slugify).filter(|s| !s.is_empty()) {
                post.insert("slug".to_string(), slug.into());
            }
            let post = ctx.collection().save(post).await?;
            Ok(ActionReply::model(post).notify(ChangeVerb::Updated))
        }),
    )
    .permission(Permission::Owner)
}

/// Guarded update shared by `vote` and `unvote`; `conflict` is raised when
/// the guard rejects a post that still exists.
async fn apply_vote(ctx: &Context, guard: Filter, update: Update, conflict: ErrorCode) -> ApiResult<Document> {
    let id = ctx.require_model_id("Post not found")?;
    if let Some(post) = ctx.collection().update_by_id(id, &guard, &update).await? {
        return Ok(post);
    }
    match ctx.collection().find_by_id(id).await? {
        Some(_) => Err(ApiError::from_code(conflict)),
        None => Err(ApiError::model_not_found("Post not found")),
    }
}

fn vote() -> ActionDefinition {
    ActionDefinition::new(
        "vote",
        handler(|ctx: Context| async move {
            let user = ctx.require_user()?.id;
            let post = apply_vote(
                &ctx,
                Filter::NotContains("voters".to_string(), user.into()),
                Update::new().add_to_set("voters", user).inc("votes", 1),
                ErrorCode::AlreadyVoted,
            )
            .await?;
            Ok(ActionReply::model(post).notify(ChangeVerb::Voted))
        }),
    )
    .permission(Permission::LoggedIn)
    .atomic()
}

fn unvote() -> ActionDefinition {
    ActionDefinition::new(
        "unvote",
        handler(|ctx: Context| async move {
            let user = ctx.require_user()?.id;
            let post = apply_vote(
                &ctx,
                Filter::Contains("voters".to_string(), user.into()),
                Update::new().pull("voters", user).inc("votes", -1),
                ErrorCode::NotVotedYet,
            )
            .await?;
            Ok(ActionReply::model(post).notify(ChangeVerb::Unvoted))
        }),
    )
    .permission(Permission::LoggedIn)
    .atomic()
}

// ============================================================================
// SCHEMA
// ============================================================================

fn graphql() -> GraphqlFragment {
    let listing = [
        ("filter", "String"),
        ("author", "ID"),
        ("slug", "String"),
        ("tag", "String"),
        ("category", "String"),
        ("limit", "Int"),
        ("offset", "Int"),
        ("sort", "String"),
    ];
    let writable = [
        ("title", "String"),
        ("content", "String"),
        ("excerpt", "String"),
        ("slug", "String"),
        ("tags", "[String!]"),
        ("categories", "[String!]"),
        ("published", "Boolean"),
    ];
    let mut update_args = vec![("id", "ID!")];
    update_args.extend_from_slice(&writable);

    GraphqlFragment::new()
        .object(
            "Post",
            &[
                ("code", "ID!"),
                ("title", "String!"),
                ("slug", "String"),
                ("content", "String"),
                ("excerpt", "String"),
                ("author", "JSON"),
                ("tags", "JSON"),
                ("categories", "JSON"),
                ("votes", "Int"),
                ("voters", "JSON"),
                ("views", "Int"),
                ("published", "Boolean"),
                ("createdAt", "Timestamp"),
                ("updatedAt", "Timestamp"),
            ],
        )
        .query("posts", "[Post!]!", "find", &listing)
        .query("postPages", "[Post!]!", "pages", &[("limit", "Int"), ("offset", "Int")])
        .query("postPageCount", "JSON", "pageCount", &[("limit", "Int")])
        .query("post", "Post", "get", &[("id", "ID!")])
        .mutation("createPost", "Post", "create", &writable)
        .mutation("updatePost", "Post", "update", &update_args)
        .mutation("removePost", "Post", "remove", &[("id", "ID!")])
        .mutation("removeAllPosts", "JSON", "removeAll", &[])
        .mutation("votePost", "Post", "vote", &[("id", "ID!")])
        .mutation("unvotePost", "Post", "unvote", &[("id", "ID!")])
}

pub fn posts_service(collection: Arc<dyn Collection>, salt: &str) -> ApiResult<ServiceDefinition> {
    ServiceDefinition::builder(POSTS, collection)
        .namespace(NAMESPACE)
        .version(1)
        .permission(Permission::LoggedIn)
        .property_filter(
            "code title slug content excerpt author tags categories votes voters views published createdAt updatedAt",
        )
        .populate(PopulateRule::by_filter("tags", TAGS, &["tag_id", "slug"]))
        .populate(PopulateRule::by_filter("categories", CATEGORIES, &["category_id", "slug"]))
        .populate(PopulateRule::by_id("author", PERSONS))
        .populate(PopulateRule::by_id("voters", PERSONS))
        .action(find())
        .action(pages())
        .action(page_count())
        .action(content())
        .action(get())
        .action(create())
        .action(update())
        .action(crud::remove().permission(Permission::Owner))
        .action(crud::remove_all().permission(Permission::Admin))
        .action(vote())
        .action(unvote())
        .graphql(graphql())
        .build(salt)
}
