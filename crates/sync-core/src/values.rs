//! Typed column values bound into parameterized statements.
//!
//! [`ColumnValue`] is the intermediate representation a flattened document
//! row carries for each destination column. It implements `ToSql` with
//! per-target-type dispatch: text targets accept every variant (the safe
//! universal encoding mixed/unknown columns rely on), while incompatible
//! combinations fail at encode time, which is what routes a malformed row
//! into the row-by-row fallback instead of poisoning a whole batch.

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use rust_decimal::Decimal;

/// A single column value of a flattened document row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double-precision float
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// UTC instant
    Timestamp(DateTime<Utc>),
    /// Structured document fragment (arrays, nested objects)
    Json(serde_json::Value),
}

impl ColumnValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

fn is_text_target(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

fn is_json_target(ty: &Type) -> bool {
    matches!(*ty, Type::JSON | Type::JSONB)
}

impl ToSql for ColumnValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            ColumnValue::Null => Ok(IsNull::Yes),

            ColumnValue::Bool(b) => {
                if is_text_target(ty) {
                    b.to_string().to_sql(ty, out)
                } else if is_json_target(ty) {
                    serde_json::Value::Bool(*b).to_sql(ty, out)
                } else {
                    b.to_sql(ty, out)
                }
            }

            ColumnValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ if is_text_target(ty) => i.to_string().to_sql(ty, out),
                _ if is_json_target(ty) => serde_json::Value::from(*i).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },

            ColumnValue::Float(f) => match *ty {
                Type::NUMERIC => Decimal::from_f64_retain(*f)
                    .ok_or("non-finite double cannot be stored as NUMERIC")?
                    .to_sql(ty, out),
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ if is_text_target(ty) => f.to_string().to_sql(ty, out),
                _ if is_json_target(ty) => serde_json::Value::from(*f).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },

            ColumnValue::Text(s) => {
                if is_json_target(ty) {
                    serde_json::Value::String(s.clone()).to_sql(ty, out)
                } else if is_text_target(ty) {
                    s.to_sql(ty, out)
                } else {
                    Err(format!("cannot encode text value for column of type {ty}").into())
                }
            }

            ColumnValue::Timestamp(dt) => match *ty {
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                _ if is_text_target(ty) => dt.to_rfc3339().to_sql(ty, out),
                _ if is_json_target(ty) => {
                    serde_json::Value::String(dt.to_rfc3339()).to_sql(ty, out)
                }
                _ => dt.to_sql(ty, out),
            },

            ColumnValue::Json(v) => {
                if is_text_target(ty) {
                    serde_json::to_string(v)?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Compatibility is decided per value at encode time; a mismatch
        // surfaces as a row-level error that the batch writer isolates.
        true
    }

    to_sql_checked!();
}
