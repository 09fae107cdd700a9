//! Unexecuted query builder
//!
//! A [`Query`] is a plain description of what to read. Handlers build one,
//! pass it through paging/sort helpers, and only then execute it against a
//! [`Collection`](crate::Collection).

use std::cmp::Ordering;

use inkwell_core::{Document, Filter, SortKey};

/// Filter, sort and window for a collection read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a query with the given filter.
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Narrow the filter (conjunction with the existing one).
    pub fn and_filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::take(&mut self.filter).and(filter);
        self
    }

    pub fn sort(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compare two documents by the sort keys in order.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        self.sort
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Run the query over an in-memory set of documents.
    pub fn apply<'a, I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut selected: Vec<&Document> =
            docs.into_iter().filter(|doc| self.filter.matches(doc)).collect();

        if !self.sort.is_empty() {
            // stable sort keeps insertion order among equal keys
            selected.sort_by(|a, b| self.compare(a, b));
        }

        selected
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell_core::document_from;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            document_from(json!({ "_id": 1, "votes": 3, "author": 1 })),
            document_from(json!({ "_id": 2, "votes": 7, "author": 2 })),
            document_from(json!({ "_id": 3, "votes": 5, "author": 1 })),
            document_from(json!({ "_id": 4, "votes": 7, "author": 1 })),
        ]
    }

    fn ids(docs: &[Document]) -> Vec<i64> {
        docs.iter().filter_map(inkwell_core::doc_id).collect()
    }

    #[test]
    fn test_apply_filter_sort_window() {
        let query = Query::filtered(Filter::eq("author", 1))
            .sort(SortKey::parse_list("-votes"))
            .skip(1)
            .limit(1);
        assert_eq!(ids(&query.apply(&docs())), vec![3]);
    }

    #[test]
    fn test_secondary_sort_key() {
        let query = Query::new().sort(SortKey::parse_list("-votes -_id"));
        assert_eq!(ids(&query.apply(&docs())), vec![4, 2, 3, 1]);
    }

    #[test]
    fn test_unsorted_keeps_insertion_order() {
        let query = Query::new().and_filter(Filter::eq("author", 1));
        assert_eq!(ids(&query.apply(&docs())), vec![1, 3, 4]);
    }
}
