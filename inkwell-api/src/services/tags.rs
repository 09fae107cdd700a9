//! Tags: stock CRUD only.

use std::sync::Arc;

use inkwell_core::Permission;
use inkwell_storage::Collection;

use crate::crud;
use crate::error::ApiResult;
use crate::routes::graphql::GraphqlFragment;
use crate::service::ServiceDefinition;

use super::TAGS;

const FIELDS: &[&str] = &["name", "tag_id", "slug"];

pub fn tags_service(collection: Arc<dyn Collection>, salt: &str) -> ApiResult<ServiceDefinition> {
    ServiceDefinition::builder(TAGS, collection)
        .version(1)
        .permission(Permission::Admin)
        .property_filter("code name tag_id slug")
        .action(crud::find(&["tag_id", "slug"]).permission(Permission::Public).cached())
        .action(crud::find_by("slug").permission(Permission::Public).cached())
        .action(crud::get().permission(Permission::Public))
        .action(crud::create(FIELDS))
        .action(crud::update(FIELDS))
        .action(crud::remove())
        .action(crud::remove_all())
        .graphql(
            GraphqlFragment::new()
                .object("Tag", &[("code", "ID!"), ("name", "String"), ("tag_id", "String"), ("slug", "String")])
                .query("tags", "[Tag!]!", "find", &[("limit", "Int"), ("offset", "Int"), ("sort", "String")])
                .query("tag", "Tag", "get", &[("id", "ID!")])
                .query("tagBySlug", "Tag", "findBySlug", &[("slug", "String!")])
                .mutation(
                    "createTag",
                    "Tag",
                    "create",
                    &[("name", "String!"), ("tag_id", "String!"), ("slug", "String")],
                )
                .mutation("removeTag", "Tag", "remove", &[("id", "ID!")]),
        )
        .build(salt)
}
