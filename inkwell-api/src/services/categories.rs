//! Categories

use std::sync::Arc;

use inkwell_core::Permission;
use inkwell_storage::Collection;

use crate::crud;
use crate::error::ApiResult;
use crate::routes::graphql::GraphqlFragment;
use crate::service::ServiceDefinition;

use super::{create_with_slug, CATEGORIES};

const FIELDS: &[&str] = &["name", "category_id", "description"];

pub fn categories_service(collection: Arc<dyn Collection>, salt: &str) -> ApiResult<ServiceDefinition> {
    ServiceDefinition::builder(CATEGORIES, collection)
        .version(1)
        .permission(Permission::Admin)
        .property_filter("code name category_id slug description")
        .action(crud::find(&["category_id"]).permission(Permission::Public).cached())
        .action(crud::find_by("slug").permission(Permission::Public).cached())
        .action(crud::get().permission(Permission::Public))
        .action(create_with_slug("name", FIELDS))
        .action(crud::update(FIELDS))
        .action(crud::remove())
        .action(crud::remove_all())
        .graphql(
            GraphqlFragment::new()
                .object(
                    "Category",
                    &[
                        ("code", "ID!"),
                        ("name", "String"),
                        ("category_id", "String"),
                        ("slug", "String"),
                        ("description", "String"),
                    ],
                )
                .query("categories", "[Category!]!", "find", &[("limit", "Int"), ("offset", "Int")])
                .query("category", "Category", "get", &[("id", "ID!")])
                .query("categoryBySlug", "Category", "findBySlug", &[("slug", "String!")])
                .mutation(
                    "createCategory",
                    "Category",
                    "create",
                    &[("name", "String!"), ("category_id", "String"), ("slug", "String"), ("description", "String")],
                ),
        )
        .build(salt)
}
