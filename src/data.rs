//! Document and field-value types.
//!
//! A [`Document`] is a flat map of named fields. The engine never interprets
//! a document beyond the fields it was configured to index and store; the
//! external identity of a document lives in a regular field (the configured
//! id field) and is extracted into a [`DocumentId`] during ingestion.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The value type for fields in a document.
///
/// Serialized untagged so that documents round-trip as plain JSON records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    /// Absent value; skipped during indexing.
    Null,
    /// Boolean, coerced to `"true"`/`"false"` when indexed.
    Bool(bool),
    /// Integer, coerced to its decimal representation when indexed.
    Int(i64),
    /// Floating point, coerced to its decimal representation when indexed.
    Float(f64),
    /// Text content to be tokenized and indexed.
    Text(String),
    /// List of values, indexed as the space-joined concatenation.
    List(Vec<DataValue>),
}

impl DataValue {
    /// Returns the text value if this is a `Text` variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value if this is an `Int` variant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float value if this is a `Float` variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean value if this is a `Bool` variant.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerce this value to the string form used by the indexing pipeline.
    ///
    /// `Null` yields `None` (the field is skipped); lists are joined with a
    /// single space.
    pub fn to_index_text(&self) -> Option<String> {
        match self {
            DataValue::Null => None,
            DataValue::Bool(b) => Some(b.to_string()),
            DataValue::Int(i) => Some(i.to_string()),
            DataValue::Float(f) => Some(f.to_string()),
            DataValue::Text(s) => Some(s.clone()),
            DataValue::List(items) => {
                let parts: Vec<String> =
                    items.iter().filter_map(|v| v.to_index_text()).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(" "))
                }
            }
        }
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float(v)
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

/// External identity of a document: an integer or a string.
///
/// Compared and hashed by value; serialized untagged so that JSON dumps hold
/// plain numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    /// Integer id.
    Int(i64),
    /// String id.
    Text(String),
}

impl DocumentId {
    /// Extract an id from a field value, if the value is a valid id type.
    pub(crate) fn from_value(value: &DataValue) -> Option<DocumentId> {
        match value {
            DataValue::Int(i) => Some(DocumentId::Int(*i)),
            DataValue::Text(s) => Some(DocumentId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{i}"),
            DocumentId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for DocumentId {
    fn from(v: i64) -> Self {
        DocumentId::Int(v)
    }
}

impl From<i32> for DocumentId {
    fn from(v: i32) -> Self {
        DocumentId::Int(v as i64)
    }
}

impl From<&str> for DocumentId {
    fn from(v: &str) -> Self {
        DocumentId::Text(v.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(v: String) -> Self {
        DocumentId::Text(v)
    }
}

/// A user record: a collection of named fields.
///
/// Field order is not significant; `BTreeMap` keeps serialized dumps stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    /// Field data.
    pub fields: BTreeMap<String, DataValue>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the document.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Add a text field.
    pub fn with_text(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_field(name, DataValue::Text(text.into()))
    }

    /// Get a reference to a field's value.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.get(name)
    }

    /// Check if the document has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of fields in the document.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
