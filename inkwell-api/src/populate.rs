//! Reference Resolver
//!
//! Substitutes foreign-key fields of serialized documents with the
//! referenced entities of a sibling service. One sub-fetch per
//! (document, field) pair, awaited as a single batch. Population is
//! best-effort: a failed fetch is logged and never fails the action.

use futures_util::future::join_all;
use inkwell_core::DocId;
use serde_json::Value as JsonValue;

use crate::service::{PopulateMode, PopulateRule, ServiceDefinition, ServiceHandle};

/// One pending substitution.
#[derive(Debug, Clone)]
pub struct ReferenceResolutionTask<'a> {
    /// Index of the source document in the batch.
    pub doc_index: usize,
    pub rule: &'a PopulateRule,
    /// Raw field value as serialized.
    pub raw: JsonValue,
}

/// Populate every rule of `service` on every document, in place.
///
/// Documents are the serialized form (internal key already replaced by
/// `code`); populated fields still hold raw foreign keys at this point.
pub async fn populate_models(service: &ServiceDefinition, docs: &mut [JsonValue]) {
    if service.populates.is_empty() {
        return;
    }

    let tasks: Vec<ReferenceResolutionTask<'_>> = docs
        .iter()
        .enumerate()
        .flat_map(|(doc_index, doc)| {
            service.populates.iter().filter_map(move |rule| {
                let raw = doc.get(&rule.field)?;
                (!raw.is_null()).then(|| ReferenceResolutionTask {
                    doc_index,
                    rule,
                    raw: raw.clone(),
                })
            })
        })
        .collect();

    let resolved = join_all(tasks.into_iter().map(|task| async move {
        let value = resolve_task(service, &task).await;
        (task, value)
    }))
    .await;

    for (task, value) in resolved {
        if let (Some(value), Some(JsonValue::Object(doc))) = (value, docs.get_mut(task.doc_index)) {
            doc.insert(task.rule.field.clone(), value);
        }
    }
}

/// Populate a single serialized document.
pub async fn populate_model(service: &ServiceDefinition, doc: JsonValue) -> JsonValue {
    let mut docs = [doc];
    populate_models(service, &mut docs).await;
    let [doc] = docs;
    doc
}

/// Replacement value for one task, or `None` to leave the field alone.
async fn resolve_task(service: &ServiceDefinition, task: &ReferenceResolutionTask<'_>) -> Option<JsonValue> {
    let sibling = match service.sibling(&task.rule.service) {
        Ok(sibling) => sibling,
        Err(e) => {
            tracing::warn!(service = %service.name, field = %task.rule.field, error = %e, "population target unavailable");
            return None;
        }
    };

    match &task.rule.mode {
        PopulateMode::ById => fetch_by_id(sibling, &task.raw).await,
        PopulateMode::ByFilter { keys } => fetch_by_references(sibling, keys, &task.raw).await,
    }
}

/// By-id-list mode. A failed or empty lookup degrades to the sibling's
/// opaque codes so internal keys never leave the process.
async fn fetch_by_id(sibling: &ServiceHandle, raw: &JsonValue) -> Option<JsonValue> {
    match raw {
        JsonValue::Array(items) => {
            let ids: Vec<DocId> = items.iter().filter_map(JsonValue::as_i64).collect();
            if ids.is_empty() {
                return None;
            }
            match sibling.get_by_ids(&ids).await {
                Ok(entities) => Some(JsonValue::Array(entities)),
                Err(e) => {
                    tracing::warn!(sibling = %sibling.name, error = %e, "population by id failed");
                    Some(JsonValue::Array(
                        ids.iter().map(|id| JsonValue::String(sibling.encode_id(*id))).collect(),
                    ))
                }
            }
        }
        scalar => {
            let id = scalar.as_i64()?;
            match sibling.get_by_id(id).await {
                Ok(Some(entity)) => Some(entity),
                Ok(None) => Some(JsonValue::String(sibling.encode_id(id))),
                Err(e) => {
                    tracing::warn!(sibling = %sibling.name, error = %e, "population by id failed");
                    Some(JsonValue::String(sibling.encode_id(id)))
                }
            }
        }
    }
}

/// By-filter-key mode. Key fields are tried in order; the first non-empty
/// result replaces the field. No result leaves the raw keys in place.
async fn fetch_by_references(sibling: &ServiceHandle, keys: &[String], raw: &JsonValue) -> Option<JsonValue> {
    let ids = match raw {
        JsonValue::Array(items) if items.is_empty() => return None,
        JsonValue::Array(items) => items.clone(),
        scalar => vec![scalar.clone()],
    };

    for key in keys {
        match sibling.find_by_filter(key, &ids).await {
            Ok(entities) if !entities.is_empty() => return Some(JsonValue::Array(entities)),
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(sibling = %sibling.name, key = %key, error = %e, "population by reference failed");
                return None;
            }
        }
    }
    None
}
