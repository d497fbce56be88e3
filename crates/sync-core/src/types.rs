//! Inferred schema types for the mongo-pg-sync engine.
//!
//! This module defines [`FieldKind`], the tagged union of primitive kinds a
//! document field can be inferred as, plus the per-field and per-collection
//! descriptors produced by sampling a source collection.

use serde::{Deserialize, Serialize};

/// The kind a document field was inferred as from a bounded sample.
///
/// Document stores carry no declared schema, so every kind here is a guess
/// refined across the sampled documents. Fields whose sampled values
/// disagree collapse to [`FieldKind::Mixed`], which maps to a safe universal
/// text encoding on the destination side rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// UTF-8 string
    String,
    /// 32- or 64-bit integer
    Integer,
    /// Double-precision float (includes high-precision decimals)
    Double,
    /// Boolean
    Boolean,
    /// Datetime instant
    Date,
    /// Source-native object identifier (24 hex characters)
    ObjectId,
    /// Array of arbitrary values
    Array,
    /// Nested document
    Object,
    /// Only null values observed
    Null,
    /// Conflicting kinds observed across the sample
    Mixed,
}

impl FieldKind {
    /// Merge the kind observed in one document with the kind accumulated so
    /// far. Null absorbs into any other kind; any other disagreement
    /// collapses to `Mixed`.
    pub fn merge(self, other: FieldKind) -> FieldKind {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldKind::Null, b) => b,
            (a, FieldKind::Null) => a,
            _ => FieldKind::Mixed,
        }
    }

    /// String form used in logs and persisted sync metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Double => "double",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::ObjectId => "objectid",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Null => "null",
            FieldKind::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single inferred field of a collection.
///
/// Nested fields are identified structurally by dotted path
/// (`address.city`); only top-level fields become destination columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name as it appears in the source documents (dotted for nested)
    pub field_name: String,
    /// Kind inferred across the sample
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Create a new field descriptor.
    pub fn new(field_name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            field_name: field_name.into(),
            kind,
        }
    }

    /// Whether this descriptor refers to a nested (dotted-path) field.
    pub fn is_nested(&self) -> bool {
        self.field_name.contains('.')
    }
}

/// The inferred schema of one source collection.
///
/// Field order is the first-seen order across the sampled documents, which
/// downstream duplicate handling depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Source collection name
    pub collection: String,
    /// Inferred fields, excluding the native id, in first-seen order
    pub fields: Vec<FieldDescriptor>,
}

impl CollectionSchema {
    /// Create a new collection schema.
    pub fn new(collection: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            collection: collection.into(),
            fields,
        }
    }

    /// Whether the sample surfaced no fields at all (empty or id-only
    /// collection). Such collections are skipped as no-op successes.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The fields eligible to become destination columns.
    pub fn top_level_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_nested())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_equal_kinds() {
        assert_eq!(FieldKind::Integer.merge(FieldKind::Integer), FieldKind::Integer);
    }

    #[test]
    fn test_merge_null_absorbs() {
        assert_eq!(FieldKind::Null.merge(FieldKind::Date), FieldKind::Date);
        assert_eq!(FieldKind::Date.merge(FieldKind::Null), FieldKind::Date);
        assert_eq!(FieldKind::Null.merge(FieldKind::Null), FieldKind::Null);
    }

    #[test]
    fn test_merge_disagreement_is_mixed() {
        assert_eq!(FieldKind::Integer.merge(FieldKind::String), FieldKind::Mixed);
        assert_eq!(FieldKind::Mixed.merge(FieldKind::Integer), FieldKind::Mixed);
    }

    #[test]
    fn test_kind_serde_round_trip() {
        let json = serde_json::to_string(&FieldKind::ObjectId).unwrap();
        assert_eq!(json, "\"object_id\"");
        let back: FieldKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FieldKind::ObjectId);
    }

    #[test]
    fn test_nested_detection() {
        assert!(FieldDescriptor::new("address.city", FieldKind::String).is_nested());
        assert!(!FieldDescriptor::new("address", FieldKind::Object).is_nested());
    }

    #[test]
    fn test_top_level_fields_excludes_nested() {
        let schema = CollectionSchema::new(
            "users",
            vec![
                FieldDescriptor::new("name", FieldKind::String),
                FieldDescriptor::new("address", FieldKind::Object),
                FieldDescriptor::new("address.city", FieldKind::String),
            ],
        );
        let top: Vec<&str> = schema
            .top_level_fields()
            .map(|f| f.field_name.as_str())
            .collect();
        assert_eq!(top, vec!["name", "address"]);
    }
}
