//! Demo content
//!
//! Inserted at boot when `INKWELL_SEED=true`, straight into the
//! collections (no notifications, nothing is cached yet). Seeding an
//! already populated store is a no-op.

use inkwell_core::{doc_id, document_from, Filter};
use inkwell_storage::Collection;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::registry::ServiceRegistry;
use crate::services::{CATEGORIES, PAGES, PERSONS, POSTS, TAGS};
use crate::slug::slugify;

/// What the seeder created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Opaque code of the demo author, for binding an API key.
    pub author_code: Option<String>,
    pub posts: usize,
}

const TAG_NAMES: &[&str] = &["Rust", "Async", "Web"];

const POSTS_SEED: &[(&str, &str, &[&str])] = &[
    (
        "Hello, Inkwell",
        "Welcome to the demo blog. Every service here answers over REST, WebSocket and GraphQL.",
        &["rust", "web"],
    ),
    (
        "Voting on posts",
        "Logged-in readers can vote once per post; a second vote is rejected.",
        &["async"],
    ),
    (
        "Draft notes",
        "Unpublished posts stay out of the public pager.",
        &["rust"],
    ),
];

pub async fn seed_demo(registry: &ServiceRegistry) -> ApiResult<SeedReport> {
    let persons = registry.get(PERSONS)?.collection.clone();
    if persons.count(&Filter::All).await? > 0 {
        tracing::info!("Store already populated, skipping demo seed");
        return Ok(SeedReport::default());
    }

    let author = persons
        .insert(document_from(json!({
            "username": "demo",
            "displayName": "Demo Author",
            "bio": "Writes the sample posts.",
            "roles": ["admin"],
        })))
        .await?;
    let author_id = doc_id(&author).ok_or_else(|| ApiError::internal_error("Seeded author has no id"))?;

    let tags = registry.get(TAGS)?.collection.clone();
    for name in TAG_NAMES {
        let slug = slugify(name);
        tags.insert(document_from(json!({ "name": name, "tag_id": slug, "slug": slug })))
            .await?;
    }

    let categories = registry.get(CATEGORIES)?.collection.clone();
    categories
        .insert(document_from(json!({
            "name": "Engineering",
            "category_id": "engineering",
            "slug": "engineering",
            "description": "How the blog is built.",
        })))
        .await?;

    registry
        .get(PAGES)?
        .collection
        .insert(document_from(json!({
            "title": "About",
            "slug": "about",
            "content": "A demo blog running on the Inkwell dispatch core.",
            "order": 1,
            "published": true,
        })))
        .await?;

    let posts = registry.get(POSTS)?.collection.clone();
    for (index, (title, content, tag_ids)) in POSTS_SEED.iter().enumerate() {
        posts
            .insert(document_from(json!({
                "title": title,
                "slug": slugify(title),
                "content": content,
                "excerpt": content.split('.').next().unwrap_or_default(),
                "author": author_id,
                "tags": tag_ids,
                "categories": ["engineering"],
                "published": index + 1 < POSTS_SEED.len(),
                "votes": 0,
                "voters": [],
                "views": 0,
            })))
            .await?;
    }

    let author_code = registry.get(PERSONS)?.codec.encode(author_id);
    tracing::info!(author = %author_code, posts = POSTS_SEED.len(), "Seeded demo content");
    Ok(SeedReport {
        author_code: Some(author_code),
        posts: POSTS_SEED.len(),
    })
}
