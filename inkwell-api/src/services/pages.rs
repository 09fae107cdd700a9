//! Static pages (about, contact, ...).

use std::sync::Arc;

use inkwell_core::{Filter, Permission, SortKey};
use inkwell_storage::{Collection, Query};

use crate::context::Context;
use crate::crud;
use crate::error::ApiResult;
use crate::routes::graphql::GraphqlFragment;
use crate::service::{handler, ActionDefinition, ActionReply, ServiceDefinition};

use super::{create_with_slug, PAGES};

const FIELDS: &[&str] = &["title", "content", "order", "published"];

/// Published pages in menu order.
fn menu() -> ActionDefinition {
    ActionDefinition::new(
        "menu",
        handler(|ctx: Context| async move {
            let query = Query::filtered(Filter::eq("published", true)).sort(vec![SortKey::asc("order")]);
            let pages = ctx.collection().find(&query).await?;
            Ok(ActionReply::models(pages))
        }),
    )
    .permission(Permission::Public)
    .cached()
}

pub fn pages_service(collection: Arc<dyn Collection>, salt: &str) -> ApiResult<ServiceDefinition> {
    ServiceDefinition::builder(PAGES, collection)
        .version(1)
        .permission(Permission::Admin)
        .property_filter("code title slug content order published createdAt updatedAt")
        .action(crud::find(&["published"]).permission(Permission::Public).cached())
        .action(menu())
        .action(crud::find_by("slug").permission(Permission::Public).cached())
        .action(crud::get().permission(Permission::Public))
        .action(create_with_slug("title", FIELDS))
        .action(crud::update(FIELDS))
        .action(crud::remove())
        .action(crud::remove_all())
        .graphql(
            GraphqlFragment::new()
                .object(
                    "Page",
                    &[
                        ("code", "ID!"),
                        ("title", "String"),
                        ("slug", "String"),
                        ("content", "String"),
                        ("order", "Int"),
                        ("published", "Boolean"),
                        ("createdAt", "Timestamp"),
                    ],
                )
                .query("pages", "[Page!]!", "find", &[("limit", "Int"), ("offset", "Int")])
                .query("menu", "[Page!]!", "menu", &[])
                .query("page", "Page", "get", &[("id", "ID!")])
                .query("pageBySlug", "Page", "findBySlug", &[("slug", "String!")])
                .mutation(
                    "createPage",
                    "Page",
                    "create",
                    &[("title", "String!"), ("content", "String"), ("slug", "String"), ("order", "Int")],
                ),
        )
        .build(salt)
}
