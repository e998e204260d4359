//! Document model shared by the write and search paths.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The value type for fields in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),

    /// String content used for keywords, IDs, or non-tokenized metadata.
    String(String),

    /// Text content to be full-text indexed.
    Text(String),

    /// Date and time in UTC.
    DateTime(chrono::DateTime<chrono::Utc>),
}

impl DataValue {
    /// Returns the text value if this is a Text or String variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) | DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Int64 variant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float value if this is a Float64 variant.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DataValue::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean value if this is a Bool variant.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the datetime value if this is a DateTime variant.
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            DataValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

// --- Conversions ---

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
        DataValue::Int64(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int64(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float64(v)
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DataValue {
    fn from(v: chrono::DateTime<chrono::Utc>) -> Self {
        DataValue::DateTime(v)
    }
}

/// A document to be indexed into a shard.
///
/// Documents are schema-less: any named field may carry any [`DataValue`].
/// All fields are both indexed (as search terms) and stored (retrievable
/// from a search snapshot).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Optional external identifier.
    pub id: Option<String>,
    /// Named field values.
    pub fields: HashMap<String, DataValue>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document::default()
    }

    /// Create an empty document with an external identifier.
    pub fn new_with_id(id: impl Into<String>) -> Self {
        Document {
            id: Some(id.into()),
            fields: HashMap::new(),
        }
    }

    /// Add a field value, consuming and returning the document for chaining.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.get(name)
    }

    /// Number of fields in the document.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builder() {
        let doc = Document::new_with_id("doc1")
            .add_field("title", "Rust Programming")
            .add_field("year", 2024_i64);

        assert_eq!(doc.id.as_deref(), Some("doc1"));
        assert_eq!(doc.get("title").and_then(|v| v.as_text()), Some("Rust Programming"));
        assert_eq!(doc.get("year").and_then(|v| v.as_integer()), Some(2024));
        assert!(doc.get("missing").is_none());
    }

    #[test]
    fn test_data_value_accessors() {
        assert_eq!(DataValue::from("x").as_text(), Some("x"));
        assert_eq!(DataValue::String("k".to_string()).as_text(), Some("k"));
        assert_eq!(DataValue::from(7_i64).as_integer(), Some(7));
        assert_eq!(DataValue::from(1.5).as_float(), Some(1.5));
        assert_eq!(DataValue::from(true).as_boolean(), Some(true));
        assert_eq!(DataValue::Null.as_text(), None);
    }

    #[test]
    fn test_document_serde_round_trip() {
        let doc = Document::new().add_field("body", "hello world");
        let json = serde_json::to_vec(&doc).unwrap();
        let back: Document = serde_json::from_slice(&json).unwrap();
        assert_eq!(doc, back);
    }
}
