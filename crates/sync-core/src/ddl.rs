//! PostgreSQL statement generation for import tables.
//!
//! This module maps inferred field kinds to PostgreSQL column types and
//! builds the CREATE TABLE and multi-row upsert statements the engine
//! executes. All identifiers are sanitized upstream and quoted here.

use crate::idents::quote_ident;
use crate::types::FieldKind;

/// Primary key column holding the source-native document id.
pub const ID_COLUMN: &str = "_id";

/// Timestamp column recording when the row was imported.
pub const IMPORTED_AT_COLUMN: &str = "_imported_at";

/// JSONB fallback column holding the full original document.
pub const RAW_DOCUMENT_COLUMN: &str = "_raw_document";

/// Column type of the native id: 24 hex characters.
pub const ID_COLUMN_TYPE: &str = "VARCHAR(24)";

/// Map an inferred field kind to its PostgreSQL column type.
///
/// Total: unrecognized or conflicting kinds fall back to TEXT, never an
/// error. Integers are stored at 64-bit width and datetimes as UTC instants.
pub fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String => "TEXT",
        FieldKind::Integer => "BIGINT",
        FieldKind::Double => "NUMERIC",
        FieldKind::Boolean => "BOOLEAN",
        FieldKind::Date => "TIMESTAMPTZ",
        FieldKind::ObjectId => "VARCHAR(24)",
        FieldKind::Array => "JSONB",
        FieldKind::Object => "JSONB",
        FieldKind::Null => "TEXT",
        FieldKind::Mixed => "TEXT",
    }
}

/// Generate the CREATE TABLE statement for an import table.
///
/// The table carries the native-id primary key, one nullable column per
/// inferred top-level field, the import timestamp, and the raw-document
/// fallback column. `columns` are (sanitized name, kind) pairs.
pub fn create_table_statement(
    schema: &str,
    table: &str,
    columns: &[(String, FieldKind)],
) -> String {
    let mut defs = vec![format!(
        "  {} {} NOT NULL",
        quote_ident(ID_COLUMN),
        ID_COLUMN_TYPE
    )];
    defs.extend(
        columns
            .iter()
            .map(|(name, kind)| format!("  {} {} NULL", quote_ident(name), column_type(*kind))),
    );
    defs.push(format!(
        "  {} TIMESTAMPTZ NOT NULL",
        quote_ident(IMPORTED_AT_COLUMN)
    ));
    defs.push(format!(
        "  {} JSONB NOT NULL",
        quote_ident(RAW_DOCUMENT_COLUMN)
    ));

    format!(
        "CREATE TABLE {}.{} (\n{},\n  PRIMARY KEY ({})\n);",
        quote_ident(schema),
        quote_ident(table),
        defs.join(",\n"),
        quote_ident(ID_COLUMN)
    )
}

/// Generate a multi-row upsert statement for `row_count` rows.
///
/// Row parameter order is: native id, the data columns in the given order,
/// import timestamp, raw document. On conflict with an existing native id
/// every non-key column is overwritten from the incoming row.
pub fn upsert_statement(
    schema: &str,
    table: &str,
    data_columns: &[String],
    row_count: usize,
) -> String {
    let mut all_columns: Vec<&str> = vec![ID_COLUMN];
    all_columns.extend(data_columns.iter().map(|c| c.as_str()));
    all_columns.push(IMPORTED_AT_COLUMN);
    all_columns.push(RAW_DOCUMENT_COLUMN);

    let width = all_columns.len();
    let column_list: Vec<String> = all_columns.iter().map(|c| quote_ident(c)).collect();

    let rows: Vec<String> = (0..row_count)
        .map(|row| {
            let placeholders: Vec<String> =
                (1..=width).map(|i| format!("${}", row * width + i)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    let updates: Vec<String> = all_columns[1..]
        .iter()
        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
        .collect();

    format!(
        "INSERT INTO {}.{} ({}) VALUES {} ON CONFLICT ({}) DO UPDATE SET {}",
        quote_ident(schema),
        quote_ident(table),
        column_list.join(", "),
        rows.join(", "),
        quote_ident(ID_COLUMN),
        updates.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_is_total() {
        for kind in [
            FieldKind::String,
            FieldKind::Integer,
            FieldKind::Double,
            FieldKind::Boolean,
            FieldKind::Date,
            FieldKind::ObjectId,
            FieldKind::Array,
            FieldKind::Object,
            FieldKind::Null,
            FieldKind::Mixed,
        ] {
            assert!(!column_type(kind).is_empty());
        }
        assert_eq!(column_type(FieldKind::Mixed), "TEXT");
        assert_eq!(column_type(FieldKind::Null), "TEXT");
    }

    #[test]
    fn test_create_table_statement_shape() {
        let stmt = create_table_statement(
            "analytics",
            "orders_42",
            &[
                ("total".to_string(), FieldKind::Double),
                ("placed_at".to_string(), FieldKind::Date),
            ],
        );

        assert!(stmt.starts_with("CREATE TABLE \"analytics\".\"orders_42\""));
        assert!(stmt.contains("\"_id\" VARCHAR(24) NOT NULL"));
        assert!(stmt.contains("\"total\" NUMERIC NULL"));
        assert!(stmt.contains("\"placed_at\" TIMESTAMPTZ NULL"));
        assert!(stmt.contains("\"_imported_at\" TIMESTAMPTZ NOT NULL"));
        assert!(stmt.contains("\"_raw_document\" JSONB NOT NULL"));
        assert!(stmt.contains("PRIMARY KEY (\"_id\")"));
    }

    #[test]
    fn test_upsert_statement_single_row() {
        let stmt = upsert_statement("analytics", "orders_42", &["total".to_string()], 1);

        assert_eq!(
            stmt,
            "INSERT INTO \"analytics\".\"orders_42\" \
             (\"_id\", \"total\", \"_imported_at\", \"_raw_document\") \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (\"_id\") DO UPDATE SET \
             \"total\" = EXCLUDED.\"total\", \
             \"_imported_at\" = EXCLUDED.\"_imported_at\", \
             \"_raw_document\" = EXCLUDED.\"_raw_document\""
        );
    }

    #[test]
    fn test_upsert_statement_numbers_placeholders_across_rows() {
        let stmt = upsert_statement("analytics", "t_1", &["a".to_string()], 3);
        assert!(stmt.contains("($1, $2, $3, $4), ($5, $6, $7, $8), ($9, $10, $11, $12)"));
    }

    #[test]
    fn test_upsert_statement_updates_all_non_key_columns() {
        let stmt = upsert_statement("s", "t", &["a".to_string(), "b".to_string()], 1);
        assert!(stmt.contains("\"a\" = EXCLUDED.\"a\""));
        assert!(stmt.contains("\"b\" = EXCLUDED.\"b\""));
        assert!(!stmt.contains("\"_id\" = EXCLUDED"));
    }
}
