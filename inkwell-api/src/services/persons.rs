//! Persons: blog authors and voters.

use std::sync::Arc;

use inkwell_core::{doc_id, Permission};
use inkwell_storage::Collection;
use serde_json::json;

use crate::context::Context;
use crate::crud;
use crate::error::{ApiError, ApiResult};
use crate::routes::graphql::GraphqlFragment;
use crate::service::{handler, ActionDefinition, ActionReply, ServiceDefinition};

use super::PERSONS;

const FIELDS: &[&str] = &["username", "displayName", "bio", "roles"];

/// The caller's own person record.
fn me() -> ActionDefinition {
    ActionDefinition::new(
        "me",
        handler(|ctx: Context| async move {
            let user = ctx.require_user()?;
            let person = ctx
                .collection()
                .find_by_id(user.id)
                .await?
                .ok_or_else(|| ApiError::entity_not_found(PERSONS, &user.code))?;
            Ok(ActionReply::model(person))
        }),
    )
    .permission(Permission::LoggedIn)
}

fn graphql() -> GraphqlFragment {
    GraphqlFragment::new()
        .object(
            "Person",
            &[
                ("code", "ID!"),
                ("username", "String!"),
                ("displayName", "String"),
                ("bio", "String"),
                ("roles", "[String!]"),
                ("createdAt", "Timestamp"),
            ],
        )
        .query(
            "persons",
            "[Person!]!",
            "find",
            &[("username", "String"), ("limit", "Int"), ("offset", "Int"), ("sort", "String")],
        )
        .query("person", "Person", "get", &[("id", "ID!")])
        .query("me", "Person", "me", &[])
        .mutation(
            "updatePerson",
            "Person",
            "update",
            &[("id", "ID!"), ("displayName", "String"), ("bio", "String")],
        )
}

pub fn persons_service(collection: Arc<dyn Collection>, salt: &str) -> ApiResult<ServiceDefinition> {
    ServiceDefinition::builder(PERSONS, collection)
        .version(1)
        .permission(Permission::LoggedIn)
        .property_filter("code username displayName bio roles createdAt")
        .action(crud::find(&["username"]).permission(Permission::Public).cached())
        .action(me())
        .action(crud::get().permission(Permission::Public))
        .action(crud::create(FIELDS).permission(Permission::Admin))
        .action(crud::update(&["displayName", "bio"]).permission(Permission::Owner))
        .action(crud::remove().permission(Permission::Admin))
        // A person owns their own record.
        .owner_checker(|ctx, user| {
            user.is_admin() || ctx.model.as_ref().and_then(doc_id) == Some(user.id)
        })
        .after_connection(|user| match user {
            Some(user) => vec![json!({
                "type": "welcome",
                "service": PERSONS,
                "data": { "code": user.code, "username": user.username },
            })],
            None => Vec::new(),
        })
        .graphql(graphql())
        .build(salt)
}
