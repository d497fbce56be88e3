//! Document flattening.
//!
//! Converts a nested source document into a flat destination row: the
//! native id, one typed value per planned column, the import timestamp, and
//! the raw-document fallback column carrying the full original record.

use crate::table::TablePlan;
use bson::Bson;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sync_core::{ColumnValue, Document, FieldKind, FlattenError};

/// One flattened destination row, with values aligned to the plan's
/// column order.
#[derive(Debug, Clone)]
pub struct FlattenedRow {
    /// Stringified native document id (primary key)
    pub id: String,
    /// Data column values, in plan order
    pub values: Vec<ColumnValue>,
    /// Import timestamp shared by the whole batch
    pub imported_at: DateTime<Utc>,
    /// Full original document in relaxed extended JSON
    pub raw_document: serde_json::Value,
}

/// Flatten a document into a destination row for `plan`.
///
/// The raw-document column is always populated with the complete record, so
/// values dropped from the column set (nested fields, sanitization
/// duplicates, unparseable dates) are never lost.
pub fn flatten_document(
    doc: &Document,
    plan: &TablePlan,
    imported_at: DateTime<Utc>,
) -> Result<FlattenedRow, FlattenError> {
    let id = document_id(doc)?;
    let raw_document = Bson::Document(doc.clone()).into_relaxed_extjson();

    let values = plan
        .columns
        .iter()
        .map(|column| match doc.get(&column.source_field) {
            Some(value) => convert_value(value, column.kind),
            None => ColumnValue::Null,
        })
        .collect();

    Ok(FlattenedRow {
        id,
        values,
        imported_at,
        raw_document,
    })
}

/// Extract and stringify the native document id.
fn document_id(doc: &Document) -> Result<String, FlattenError> {
    match doc.get("_id") {
        None => Err(FlattenError::MissingId),
        Some(Bson::ObjectId(oid)) => Ok(oid.to_hex()),
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(Bson::Int32(i)) => Ok(i.to_string()),
        Some(Bson::Int64(i)) => Ok(i.to_string()),
        Some(other) => Err(FlattenError::UnsupportedId(format!("{other:?}"))),
    }
}

/// Convert one field value according to its inferred kind.
fn convert_value(value: &Bson, kind: FieldKind) -> ColumnValue {
    if matches!(value, Bson::Null | Bson::Undefined) {
        return ColumnValue::Null;
    }
    match kind {
        FieldKind::Date => convert_date_value(value),
        FieldKind::ObjectId => ColumnValue::Text(stringify_id_like(value)),
        FieldKind::Array | FieldKind::Object => {
            ColumnValue::Json(value.clone().into_relaxed_extjson())
        }
        _ => convert_scalar(value),
    }
}

/// Convert a value under a date-kind column.
///
/// A string that does not parse as a datetime leaves the typed column NULL;
/// the unparsed value remains available in the raw-document column, so the
/// document itself is still stored.
fn convert_date_value(value: &Bson) -> ColumnValue {
    match value {
        Bson::DateTime(dt) => ColumnValue::Timestamp(dt.to_chrono()),
        Bson::Timestamp(ts) => DateTime::from_timestamp(i64::from(ts.time), ts.increment)
            .map(ColumnValue::Timestamp)
            .unwrap_or(ColumnValue::Null),
        Bson::String(s) => match parse_datetime(s) {
            Some(dt) => ColumnValue::Timestamp(dt),
            None => {
                tracing::debug!(
                    "Value '{s}' did not parse as a datetime, keeping it only in the raw document"
                );
                ColumnValue::Null
            }
        },
        other => convert_scalar(other),
    }
}

/// Pass-through conversion for values whose kind needs no coercion.
fn convert_scalar(value: &Bson) -> ColumnValue {
    match value {
        Bson::Double(f) => ColumnValue::Float(*f),
        Bson::String(s) => ColumnValue::Text(s.clone()),
        Bson::Boolean(b) => ColumnValue::Bool(*b),
        Bson::Int32(i) => ColumnValue::Int(i64::from(*i)),
        Bson::Int64(i) => ColumnValue::Int(*i),
        Bson::DateTime(dt) => ColumnValue::Timestamp(dt.to_chrono()),
        Bson::ObjectId(oid) => ColumnValue::Text(oid.to_hex()),
        Bson::Symbol(s) => ColumnValue::Text(s.clone()),
        Bson::Decimal128(d) => {
            let rendered = d.to_string();
            match rendered.parse::<f64>() {
                Ok(f) => ColumnValue::Float(f),
                Err(_) => ColumnValue::Text(rendered),
            }
        }
        other => ColumnValue::Json(other.clone().into_relaxed_extjson()),
    }
}

fn stringify_id_like(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Parse the datetime renderings commonly found in document fields.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}
