//! Target resolution against business collections.
//!
//! A scoped lock protects one document of a business collection. The document
//! is located once by a [`TargetFilter`] and its `_id` becomes part of the
//! lock key.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding a document's identity.
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// Equality filter selecting the target document of a scoped lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFilter {
    /// Top-level field to compare.
    pub field: String,

    /// Value the field must equal.
    pub value: Value,
}

impl TargetFilter {
    /// Create a filter matching documents where `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the document satisfies the filter.
    pub fn matches(&self, document: &Value) -> bool {
        document.get(&self.field) == Some(&self.value)
    }
}

impl std::fmt::Display for TargetFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} == {}", self.field, self.value)
    }
}

/// Render a document's `_id` as a stable string identity.
///
/// Strings are used verbatim, anything else in its JSON form.
pub fn document_id(document: &Value) -> Option<String> {
    match document.get(DOCUMENT_ID_FIELD)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Lookup of target documents in business collections.
pub trait DocumentSource: Send + Sync {
    /// Identity of the first document in `collection` matching `filter`.
    fn find_first_id(&self, collection: &str, filter: &TargetFilter) -> Result<Option<String>>;
}
