//! In-memory collection
//!
//! Backs every service in tests and in the demo server. Documents live in a
//! `BTreeMap` keyed by the auto-incremented internal id, so an unsorted scan
//! returns them in insertion order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use inkwell_core::{
    doc_id, DocId, Document, Filter, InkwellResult, StorageError, Update, ID_FIELD,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::collection::Collection;
use crate::query::Query;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Collection held entirely in process memory.
#[derive(Debug)]
pub struct InMemoryCollection {
    name: String,
    docs: RwLock<BTreeMap<DocId, Document>>,
    next_id: AtomicI64,
    unique: Vec<String>,
}

impl InMemoryCollection {
    /// Create an empty collection; ids start at 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            unique: Vec::new(),
        }
    }

    /// Enforce uniqueness of a field's non-null values.
    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    fn check_unique(
        &self,
        docs: &BTreeMap<DocId, Document>,
        candidate: &Document,
        own_id: DocId,
    ) -> Result<(), StorageError> {
        for field in &self.unique {
            let Some(value) = candidate.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = docs
                .iter()
                .any(|(id, doc)| *id != own_id && doc.get(field) == Some(value));
            if clash {
                return Err(StorageError::DuplicateKey {
                    collection: self.name.clone(),
                    field: field.clone(),
                    value: match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &Query) -> InkwellResult<Vec<Document>> {
        let docs = self.docs.read().await;
        Ok(query.apply(docs.values()))
    }

    async fn find_by_id(&self, id: DocId) -> InkwellResult<Option<Document>> {
        Ok(self.docs.read().await.get(&id).cloned())
    }

    async fn count(&self, filter: &Filter) -> InkwellResult<u64> {
        let docs = self.docs.read().await;
        Ok(docs.values().filter(|doc| filter.matches(doc)).count() as u64)
    }

    async fn insert(&self, mut doc: Document) -> InkwellResult<Document> {
        let mut docs = self.docs.write().await;

        let id = self.next_id.load(Ordering::SeqCst);
        doc.insert(ID_FIELD.to_string(), Value::from(id));
        let now = now_string();
        if !doc.get(CREATED_AT).is_some_and(Value::is_string) {
            doc.insert(CREATED_AT.to_string(), Value::from(now.clone()));
        }
        doc.insert(UPDATED_AT.to_string(), Value::from(now));

        self.check_unique(&docs, &doc, id)?;
        self.next_id.fetch_add(1, Ordering::SeqCst);
        docs.insert(id, doc.clone());

        tracing::trace!(collection = %self.name, id, "document inserted");
        Ok(doc)
    }

    async fn save(&self, mut doc: Document) -> InkwellResult<Document> {
        let id = doc_id(&doc).ok_or_else(|| StorageError::InvalidDocument {
            collection: self.name.clone(),
            reason: format!("missing {}", ID_FIELD),
        })?;

        let mut docs = self.docs.write().await;
        let existing = docs.get(&id).ok_or_else(|| StorageError::NotFound {
            collection: self.name.clone(),
            id,
        })?;

        if !doc.contains_key(CREATED_AT) {
            if let Some(created) = existing.get(CREATED_AT) {
                doc.insert(CREATED_AT.to_string(), created.clone());
            }
        }
        doc.insert(UPDATED_AT.to_string(), Value::from(now_string()));

        self.check_unique(&docs, &doc, id)?;
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update_by_id(
        &self,
        id: DocId,
        guard: &Filter,
        update: &Update,
    ) -> InkwellResult<Option<Document>> {
        let mut docs = self.docs.write().await;
        let Some(current) = docs.get(&id) else {
            return Ok(None);
        };
        if !guard.matches(current) {
            return Ok(None);
        }

        let mut updated = current.clone();
        update.apply(&mut updated);
        updated.insert(ID_FIELD.to_string(), Value::from(id));
        updated.insert(UPDATED_AT.to_string(), Value::from(now_string()));

        self.check_unique(&docs, &updated, id)?;
        docs.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn remove(&self, id: DocId) -> InkwellResult<Option<Document>> {
        Ok(self.docs.write().await.remove(&id))
    }

    async fn remove_all(&self, filter: &Filter) -> InkwellResult<u64> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|_, doc| !filter.matches(doc));
        Ok((before - docs.len()) as u64)
    }
}
