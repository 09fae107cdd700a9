//! Document collection trait
//!
//! The document store is an external collaborator of the dispatch core.
//! Services only see it through this trait.

use async_trait::async_trait;
use inkwell_core::{DocId, Document, Filter, InkwellResult, Update};

use crate::query::Query;

/// Async document collection.
///
/// Implementations assign the internal `_id` key on insert and maintain the
/// `createdAt` / `updatedAt` timestamps.
#[async_trait]
pub trait Collection: Send + Sync + std::fmt::Debug {
    /// Collection name (also the opaque-id namespace).
    fn name(&self) -> &str;

    /// Execute a query.
    async fn find(&self, query: &Query) -> InkwellResult<Vec<Document>>;

    /// Load one document by internal key.
    async fn find_by_id(&self, id: DocId) -> InkwellResult<Option<Document>>;

    /// Load several documents by internal key, in the order given.
    /// Missing keys are skipped.
    async fn find_by_ids(&self, ids: &[DocId]) -> InkwellResult<Vec<Document>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.find_by_id(*id).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// First document matching the filter.
    async fn find_one(&self, filter: &Filter) -> InkwellResult<Option<Document>> {
        let query = Query::filtered(filter.clone()).limit(1);
        Ok(self.find(&query).await?.into_iter().next())
    }

    /// Number of documents matching the filter.
    async fn count(&self, filter: &Filter) -> InkwellResult<u64>;

    /// Insert a new document and return it with its assigned key.
    async fn insert(&self, doc: Document) -> InkwellResult<Document>;

    /// Replace an existing document (matched on `_id`).
    async fn save(&self, doc: Document) -> InkwellResult<Document>;

    /// Apply `update` to the document with key `id` if it also matches
    /// `guard`, in one atomic step. Returns the updated document, or `None`
    /// when the document is missing or the guard rejected it.
    async fn update_by_id(
        &self,
        id: DocId,
        guard: &Filter,
        update: &Update,
    ) -> InkwellResult<Option<Document>>;

    /// Remove one document, returning it if it existed.
    async fn remove(&self, id: DocId) -> InkwellResult<Option<Document>>;

    /// Remove every document matching the filter; returns how many went.
    async fn remove_all(&self, filter: &Filter) -> InkwellResult<u64>;
}
