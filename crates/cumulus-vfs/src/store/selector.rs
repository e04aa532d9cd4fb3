//! Query selectors for [`DocumentStore::find`](super::DocumentStore::find).

use serde_json::Value;

/// Predicate over top-level document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `doc[field] == value`
    Eq(String, Value),
    /// `doc[field]` is a string starting with the prefix.
    StartsWith(String, String),
    /// Every inner selector matches. An empty conjunction matches everything.
    And(Vec<Selector>),
}

impl Selector {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::StartsWith(field.into(), prefix.into())
    }

    pub fn and(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self::And(selectors.into_iter().collect())
    }

    /// Evaluate against a JSON document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Selector::Eq(field, value) => doc.get(field).unwrap_or(&Value::Null) == value,
            Selector::StartsWith(field, prefix) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Selector::And(inner) => inner.iter().all(|s| s.matches(doc)),
        }
    }
}

/// A find query: selector plus optional result cap.
#[derive(Debug, Clone, PartialEq)]
pub struct FindRequest {
    pub selector: Selector,
    pub limit: Option<usize>,
}

impl FindRequest {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
