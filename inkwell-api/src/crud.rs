//! Stock CRUD actions
//!
//! Services that need nothing special for a verb can register one of these
//! instead of writing a handler. They are ordinary [`ActionDefinition`]s: the
//! caller still picks permission and cache scope with the usual builders.
//!
//! `create` and `update` copy request parameters into the document, but only
//! for the fields the service passes in; anything else in the request is
//! ignored.

use std::sync::Arc;

use inkwell_core::{Document, Filter};
use inkwell_storage::Query;
use serde_json::json;

use crate::context::Context;
use crate::error::{ApiError, ErrorCode};
use crate::events::ChangeVerb;
use crate::service::{handler, ActionDefinition, ActionReply};

fn owned_fields(fields: &[&str]) -> Arc<Vec<String>> {
    Arc::new(fields.iter().map(|f| f.to_string()).collect())
}

/// Copy the listed, non-null parameters into `doc`.
fn dump_params(ctx: &Context, fields: &[String], doc: &mut Document) {
    for field in fields {
        if let Some(value) = ctx.param(field) {
            doc.insert(field.clone(), value.clone());
        }
    }
}

/// `find`: paged list; equality filters on the listed parameters.
pub fn find(filterable: &[&str]) -> ActionDefinition {
    let filterable = owned_fields(filterable);
    ActionDefinition::new(
        "find",
        handler(move |ctx: Context| {
            let filterable = filterable.clone();
            async move {
                let mut query = Query::new();
                for field in filterable.iter() {
                    if let Some(value) = ctx.param(field) {
                        query = query.and_filter(Filter::eq(field.clone(), value.clone()));
                    }
                }
                let docs = ctx.collection().find(&ctx.query_page_sort(query)).await?;
                Ok(ActionReply::models(docs))
            }
        }),
    )
}

/// `get`: the resolved model.
pub fn get() -> ActionDefinition {
    ActionDefinition::new(
        "get",
        handler(|ctx: Context| async move {
            let model = ctx.assert_model_exists("Model not found")?;
            Ok(ActionReply::model(model.clone()))
        }),
    )
}

/// `create`: insert a document built from the listed parameters.
pub fn create(fields: &[&str]) -> ActionDefinition {
    let fields = owned_fields(fields);
    ActionDefinition::new(
        "create",
        handler(move |ctx: Context| {
            let fields = fields.clone();
            async move {
                let mut doc = Document::new();
                dump_params(&ctx, &fields, &mut doc);
                let created = ctx.collection().insert(doc).await?;
                Ok(ActionReply::model(created).notify(ChangeVerb::Created))
            }
        }),
    )
}

/// `update`: overwrite the listed fields of the resolved model.
pub fn update(fields: &[&str]) -> ActionDefinition {
    let fields = owned_fields(fields);
    ActionDefinition::new(
        "update",
        handler(move |ctx: Context| {
            let fields = fields.clone();
            async move {
                let mut model = ctx.assert_model_exists("Model not found")?.clone();
                dump_params(&ctx, &fields, &mut model);
                let saved = ctx.collection().save(model).await?;
                Ok(ActionReply::model(saved).notify(ChangeVerb::Updated))
            }
        }),
    )
}

/// `remove`: delete the resolved model and return it.
pub fn remove() -> ActionDefinition {
    ActionDefinition::new(
        "remove",
        handler(|ctx: Context| async move {
            let id = ctx.require_model_id("Model not found")?;
            let removed = ctx
                .collection()
                .remove(id)
                .await?
                .ok_or_else(|| ApiError::model_not_found("Model not found"))?;
            Ok(ActionReply::model(removed).notify(ChangeVerb::Removed))
        }),
    )
}

/// `removeAll`: empty the collection; replies with the number removed.
pub fn remove_all() -> ActionDefinition {
    ActionDefinition::new(
        "removeAll",
        handler(|ctx: Context| async move {
            let removed = ctx.collection().remove_all(&Filter::All).await?;
            Ok(ActionReply::json(json!({ "removed": removed })).notify(ChangeVerb::RemovedAll))
        }),
    )
}

/// `findBy<Field>`: first document whose `field` equals the parameter of
/// the same name, or `null`.
pub fn find_by(field: &str) -> ActionDefinition {
    let field = field.to_string();
    ActionDefinition::new(
        find_by_name(&field),
        handler(move |ctx: Context| {
            let field = field.clone();
            async move {
                let Some(value) = ctx.param(&field).cloned() else {
                    return Err(ctx.error_bad_request(
                        ErrorCode::MissingField,
                        format!("Missing required field: {}", field),
                    ));
                };
                match ctx.collection().find_one(&Filter::eq(field, value)).await? {
                    Some(doc) => Ok(ActionReply::model(doc)),
                    None => Ok(ActionReply::empty()),
                }
            }
        }),
    )
}

/// `slug` → `findBySlug`.
pub fn find_by_name(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("findBy{}{}", first.to_uppercase(), chars.as_str()),
        None => "findBy".to_string(),
    }
}
