//! Filter, sort and update expressions for document queries
//!
//! These are the store-agnostic building blocks of a query: a [`Filter`]
//! selects documents, [`SortKey`]s order them, and an [`Update`] describes an
//! atomic modification (set / increment / add-to-set / pull).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::Document;

// ============================================================================
// FILTER
// ============================================================================

/// Document selection predicate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Match every document.
    #[default]
    All,
    /// Field equals value (or, for array fields, contains it).
    Eq(String, Value),
    /// Field equals any of the values.
    In(String, Vec<Value>),
    /// Array field contains the value.
    Contains(String, Value),
    /// Array field does not contain the value (missing fields qualify).
    NotContains(String, Value),
    /// All sub-filters match.
    And(Vec<Filter>),
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Create a membership filter.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(field.into(), values)
    }

    /// Combine with another filter; `All` is the identity.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) | (other, Filter::All) => other,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Evaluate the predicate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, expected) => field_matches(doc.get(field), expected),
            Filter::In(field, candidates) => candidates
                .iter()
                .any(|candidate| field_matches(doc.get(field), candidate)),
            Filter::Contains(field, value) => array_contains(doc.get(field), value),
            Filter::NotContains(field, value) => !array_contains(doc.get(field), value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

fn field_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| scalar_eq(item, expected))
        }
        Some(value) => scalar_eq(value, expected),
        None => expected.is_null(),
    }
}

fn array_contains(actual: Option<&Value>, value: &Value) -> bool {
    matches!(actual, Some(Value::Array(items)) if items.iter().any(|item| scalar_eq(item, value)))
}

/// JSON equality, except that a string equals a bool or number with the
/// same text (`"true"` == `true`, `"5"` == `5`). Query strings only carry
/// strings, and cache keys compare scalars the same way.
fn scalar_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(s), Value::Bool(b)) | (Value::Bool(b), Value::String(s)) => {
            s == if *b { "true" } else { "false" }
        }
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        _ => left == right,
    }
}

// ============================================================================
// SORT
// ============================================================================

/// Sort direction for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One sort key, e.g. `-createdAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Parse a sort specification such as `"-createdAt -votes"` or
    /// `"title,-views"`. A leading `-` means descending, `+` is accepted
    /// and ignored.
    pub fn parse_list(spec: &str) -> Vec<SortKey> {
        spec.split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .filter_map(|part| match part.strip_prefix('-') {
                Some("") => None,
                Some(field) => Some(SortKey::desc(field)),
                None => {
                    let field = part.trim_start_matches('+');
                    (!field.is_empty()).then(|| SortKey::asc(field))
                }
            })
            .collect()
    }

    /// Compare two documents on this key.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Total order over optional JSON values: missing/null < bool < number < string.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// Atomic modification applied to a single document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Update {
    pub set: Document,
    pub inc: Vec<(String, i64)>,
    pub add_to_set: Vec<(String, Value)>,
    pub pull: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn inc(mut self, field: impl Into<String>, by: i64) -> Self {
        self.inc.push((field.into(), by));
        self
    }

    pub fn add_to_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add_to_set.push((field.into(), value.into()));
        self
    }

    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pull.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.add_to_set.is_empty() && self.pull.is_empty()
    }

    /// Apply every operator to the document in place.
    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.set {
            doc.insert(field.clone(), value.clone());
        }

        for (field, by) in &self.inc {
            let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
            doc.insert(field.clone(), Value::from(current.saturating_add(*by)));
        }

        for (field, value) in &self.add_to_set {
            let entry = doc
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(items) = entry {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }

        for (field, value) in &self.pull {
            if let Some(Value::Array(items)) = doc.get_mut(field) {
                items.retain(|item| item != value);
            }
        }
    }
}
