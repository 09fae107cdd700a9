//! Blog Services
//!
//! The five services of the blog, wired on the dispatch core:
//!
//! | Service | Mount | Notes |
//! |---|---|---|
//! | `persons` | `/api/persons` | authors and voters; population target |
//! | `posts` | `/api/hexoposts` | voting, view counting, client paging |
//! | `pages` | `/api/pages` | static pages |
//! | `tags` | `/api/tags` | stock CRUD plus `findBySlug` |
//! | `categories` | `/api/categories` | stock CRUD plus `findBySlug` |
//!
//! Registration order matters only for `init`: population targets must be
//! registered before `init` runs, not before the services that use them.

mod categories;
mod pages;
mod persons;
mod posts;
mod tags;

use std::sync::Arc;

use inkwell_core::Document;
use inkwell_storage::InMemoryCollection;

use crate::context::Context;
use crate::error::{ApiResult, ErrorCode};
use crate::events::ChangeVerb;
use crate::registry::ServiceRegistry;
use crate::service::{handler, ActionDefinition, ActionReply, ServiceDefinition};
use crate::slug::slug_if_missing;

pub use categories::categories_service;
pub use pages::pages_service;
pub use persons::persons_service;
pub use posts::posts_service;
pub use tags::tags_service;

pub const PERSONS: &str = "persons";
pub const POSTS: &str = "posts";
pub const PAGES: &str = "pages";
pub const TAGS: &str = "tags";
pub const CATEGORIES: &str = "categories";

/// Register every blog service, each over a fresh in-memory collection.
pub fn register_all(registry: &mut ServiceRegistry, salt: &str) -> ApiResult<()> {
    let services: [ServiceDefinition; 5] = [
        persons_service(Arc::new(InMemoryCollection::new(PERSONS).with_unique("username")), salt)?,
        tags_service(Arc::new(InMemoryCollection::new(TAGS).with_unique("tag_id")), salt)?,
        categories_service(
            Arc::new(InMemoryCollection::new(CATEGORIES).with_unique("slug")),
            salt,
        )?,
        pages_service(Arc::new(InMemoryCollection::new(PAGES).with_unique("slug")), salt)?,
        posts_service(Arc::new(InMemoryCollection::new(POSTS).with_unique("slug")), salt)?,
    ];
    for service in services {
        registry.register(service)?;
    }
    Ok(())
}

/// `create` that fills a missing `slug` from `name_field`.
///
/// `name_field` is required; the listed `fields` are copied as in
/// [`crate::crud::create`].
pub(crate) fn create_with_slug(name_field: &'static str, fields: &[&str]) -> ActionDefinition {
    let fields: Arc<Vec<String>> = Arc::new(fields.iter().map(|f| f.to_string()).collect());
    ActionDefinition::new(
        "create",
        handler(move |mut ctx: Context| {
            let fields = fields.clone();
            async move {
                ctx.validate_param(name_field)
                    .trim()
                    .is_string("must be a string")
                    .not_empty("is required");
                if ctx.has_validation_errors() {
                    return Err(ctx.error_bad_request(ErrorCode::ValidationFailed, "Invalid parameters"));
                }

                let mut doc = Document::new();
                for field in fields.iter() {
                    if let Some(value) = ctx.param(field) {
                        doc.insert(field.clone(), value.clone());
                    }
                }
                let slug = slug_if_missing(ctx.param_str(name_field), ctx.param_str("slug"));
                if let Some(slug) = slug {
                    doc.insert("slug".to_string(), slug.into());
                }

                let created = ctx.collection().insert(doc).await?;
                Ok(ActionReply::model(created).notify(ChangeVerb::Created))
            }
        }),
    )
}
