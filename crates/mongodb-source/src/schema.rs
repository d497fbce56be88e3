//! Bounded-sample schema inference for MongoDB collections.
//!
//! A collection's schema is inferred by classifying every field of up to
//! `sample_size` documents and merging the observed kinds. Nested document
//! fields are recorded under dotted paths so the engine can exclude them
//! from the destination column set while keeping them discoverable.

use mongodb::{bson::doc, bson::Bson, Database};
use std::collections::HashMap;
use sync_core::{CollectionSchema, Document, FieldDescriptor, FieldKind};

/// Default number of documents sampled per collection.
pub const DEFAULT_SAMPLE_SIZE: u32 = 100;

/// Infer a collection's schema from a bounded sample of its documents.
pub async fn infer_collection_schema(
    db: &Database,
    collection: &str,
    sample_size: u32,
) -> anyhow::Result<CollectionSchema> {
    let coll = db.collection::<Document>(collection);
    let mut cursor = coll.find(doc! {}).limit(i64::from(sample_size)).await?;

    let mut docs = Vec::new();
    while cursor.advance().await? {
        let doc: Document = cursor.current().try_into()?;
        docs.push(doc);
    }

    let schema = infer_from_documents(collection, &docs);
    tracing::debug!(
        "Inferred {} fields for collection '{}' from {} sampled documents",
        schema.fields.len(),
        collection,
        docs.len()
    );
    Ok(schema)
}

/// Infer a schema from an already-materialized document sample.
///
/// Field order is first-seen order across the sample; the native `_id`
/// field is excluded because the engine manages it as the primary key.
pub fn infer_from_documents(collection: &str, docs: &[Document]) -> CollectionSchema {
    let mut fields: Vec<FieldDescriptor> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for doc in docs {
        for (key, value) in doc {
            if key == "_id" {
                continue;
            }
            observe_field(&mut fields, &mut index, key.clone(), value);
        }
    }

    CollectionSchema::new(collection, fields)
}

fn observe_field(
    fields: &mut Vec<FieldDescriptor>,
    index: &mut HashMap<String, usize>,
    path: String,
    value: &Bson,
) {
    let kind = classify_bson(value);

    // Record nested fields under their dotted path before merging the
    // parent, so a parent always precedes its children in field order.
    match index.get(&path) {
        Some(&i) => {
            let merged = fields[i].kind.merge(kind);
            fields[i].kind = merged;
        }
        None => {
            index.insert(path.clone(), fields.len());
            fields.push(FieldDescriptor::new(path.clone(), kind));
        }
    }

    if let Bson::Document(nested) = value {
        for (key, nested_value) in nested {
            observe_field(fields, index, format!("{path}.{key}"), nested_value);
        }
    }
}

/// Classify a single BSON value into an inferred field kind.
fn classify_bson(value: &Bson) -> FieldKind {
    match value {
        Bson::String(_) | Bson::Symbol(_) => FieldKind::String,
        Bson::Int32(_) | Bson::Int64(_) => FieldKind::Integer,
        Bson::Double(_) | Bson::Decimal128(_) => FieldKind::Double,
        Bson::Boolean(_) => FieldKind::Boolean,
        Bson::DateTime(_) | Bson::Timestamp(_) => FieldKind::Date,
        Bson::ObjectId(_) => FieldKind::ObjectId,
        Bson::Array(_) => FieldKind::Array,
        Bson::Document(_) => FieldKind::Object,
        Bson::Null | Bson::Undefined => FieldKind::Null,
        _ => FieldKind::Mixed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn test_infer_classifies_primitive_kinds() {
        let docs = vec![doc! {
            "_id": ObjectId::new(),
            "name": "Ada",
            "age": 36i32,
            "score": 99.5,
            "active": true,
            "joined": bson::DateTime::now(),
            "ref_id": ObjectId::new(),
            "tags": ["a", "b"],
            "missing": Bson::Null,
        }];

        let schema = infer_from_documents("users", &docs);
        let kinds: HashMap<&str, FieldKind> = schema
            .fields
            .iter()
            .map(|f| (f.field_name.as_str(), f.kind))
            .collect();

        assert_eq!(kinds["name"], FieldKind::String);
        assert_eq!(kinds["age"], FieldKind::Integer);
        assert_eq!(kinds["score"], FieldKind::Double);
        assert_eq!(kinds["active"], FieldKind::Boolean);
        assert_eq!(kinds["joined"], FieldKind::Date);
        assert_eq!(kinds["ref_id"], FieldKind::ObjectId);
        assert_eq!(kinds["tags"], FieldKind::Array);
        assert_eq!(kinds["missing"], FieldKind::Null);
        assert!(!kinds.contains_key("_id"));
    }

    #[test]
    fn test_infer_merges_conflicts_to_mixed() {
        let docs = vec![
            doc! { "value": 1i32 },
            doc! { "value": "one" },
        ];
        let schema = infer_from_documents("things", &docs);
        assert_eq!(schema.fields[0].kind, FieldKind::Mixed);
    }

    #[test]
    fn test_infer_null_absorbs_into_observed_kind() {
        let docs = vec![
            doc! { "value": Bson::Null },
            doc! { "value": 2i64 },
            doc! { "value": Bson::Null },
        ];
        let schema = infer_from_documents("things", &docs);
        assert_eq!(schema.fields[0].kind, FieldKind::Integer);
    }

    #[test]
    fn test_infer_records_nested_fields_with_dotted_paths() {
        let docs = vec![doc! {
            "address": { "city": "Berlin", "zip": "10115" },
        }];
        let schema = infer_from_documents("users", &docs);
        let names: Vec<&str> = schema.fields.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["address", "address.city", "address.zip"]);
        assert_eq!(schema.fields[0].kind, FieldKind::Object);
    }

    #[test]
    fn test_infer_preserves_first_seen_order() {
        let docs = vec![
            doc! { "b": 1i32, "a": 1i32 },
            doc! { "c": 1i32, "a": 1i32 },
        ];
        let schema = infer_from_documents("things", &docs);
        let names: Vec<&str> = schema.fields.iter().map(|f| f.field_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_infer_empty_sample_is_schema_empty() {
        let schema = infer_from_documents("empty", &[]);
        assert!(schema.is_empty());

        let id_only = vec![doc! { "_id": ObjectId::new() }];
        let schema = infer_from_documents("id_only", &id_only);
        assert!(schema.is_empty());
    }
}
