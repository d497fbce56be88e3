//! Destination table management.
//!
//! Builds the column plan for a collection's import table, creates the
//! table lazily on first import, and registers it in the table catalog that
//! downstream modeling tooling discovers tables through. Existing tables
//! are never altered; a later run only backfills a missing catalog entry.

use anyhow::Context;
use sync_core::{
    create_table_statement, physical_table_name, quote_ident, sanitize_identifier,
    FieldDescriptor, FieldKind, ID_COLUMN, IMPORTED_AT_COLUMN, RAW_DOCUMENT_COLUMN,
};
use tokio_postgres::Client;

/// One destination column derived from an inferred field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedColumn {
    /// Sanitized column name
    pub name: String,
    /// Field name as it appears in the source documents
    pub source_field: String,
    /// Inferred kind driving the column type
    pub kind: FieldKind,
}

/// The full plan for one collection's destination table.
#[derive(Debug, Clone)]
pub struct TablePlan {
    /// Destination schema name (sanitized)
    pub schema_name: String,
    /// Physical table name, unique per (collection, data source)
    pub table_name: String,
    /// Data columns in inferred-field order
    pub columns: Vec<PlannedColumn>,
}

impl TablePlan {
    /// Build the plan for a collection from its inferred fields.
    pub fn new(
        schema_name: &str,
        collection: &str,
        data_source_id: i64,
        fields: &[FieldDescriptor],
    ) -> Self {
        Self {
            schema_name: sanitize_identifier(schema_name),
            table_name: physical_table_name(collection, data_source_id),
            columns: build_column_plan(fields),
        }
    }

    /// The CREATE TABLE statement for this plan.
    pub fn create_table_statement(&self) -> String {
        let columns: Vec<(String, FieldKind)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.kind))
            .collect();
        create_table_statement(&self.schema_name, &self.table_name, &columns)
    }

    /// The data column names, in plan order.
    pub fn data_column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Derive the destination column set from the inferred fields.
///
/// Nested (dotted-path) fields are excluded, as are fields whose sanitized
/// name collides with an earlier field or with one of the engine's own
/// columns; the first field wins and later duplicates are dropped with a
/// logged notice. Dropped fields remain reachable through the raw-document
/// column.
pub fn build_column_plan(fields: &[FieldDescriptor]) -> Vec<PlannedColumn> {
    let mut seen: std::collections::HashSet<String> =
        [ID_COLUMN, IMPORTED_AT_COLUMN, RAW_DOCUMENT_COLUMN]
            .iter()
            .map(|s| s.to_string())
            .collect();

    let mut columns = Vec::new();
    for field in fields {
        if field.is_nested() {
            tracing::trace!(
                "Skipping nested field '{}' (kept in the raw document column)",
                field.field_name
            );
            continue;
        }

        let name = sanitize_identifier(&field.field_name);
        if !seen.insert(name.clone()) {
            tracing::warn!(
                "Field '{}' sanitizes to existing column \"{}\", dropping it from the column set",
                field.field_name,
                name
            );
            continue;
        }

        columns.push(PlannedColumn {
            name,
            source_field: field.field_name.clone(),
            kind: field.kind,
        });
    }
    columns
}

/// Ensure the destination table for `plan` exists and is registered.
///
/// Creates the schema and table on first import; an existing table is left
/// untouched apart from a catalog backfill check. Catalog registration is
/// best-effort and never fails the import; only DDL errors propagate.
pub async fn ensure_table(
    client: &Client,
    plan: &TablePlan,
    data_source_id: i64,
    owner_id: Option<i64>,
    collection: &str,
) -> anyhow::Result<()> {
    if table_exists(client, &plan.schema_name, &plan.table_name).await? {
        tracing::debug!(
            "Table \"{}\".\"{}\" already exists, verifying catalog entry",
            plan.schema_name,
            plan.table_name
        );
        if let Err(e) = register_table(client, data_source_id, owner_id, plan, collection).await {
            tracing::warn!(
                "Catalog backfill for \"{}\".\"{}\" failed (continuing): {e}",
                plan.schema_name,
                plan.table_name
            );
        }
        return Ok(());
    }

    client
        .execute(
            &format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&plan.schema_name)),
            &[],
        )
        .await
        .with_context(|| format!("failed to create schema \"{}\"", plan.schema_name))?;

    let stmt = plan.create_table_statement();
    tracing::info!(
        "Creating table \"{}\".\"{}\" with {} inferred columns",
        plan.schema_name,
        plan.table_name,
        plan.columns.len()
    );
    client
        .batch_execute(&stmt)
        .await
        .with_context(|| format!("failed to create table \"{}\"", plan.table_name))?;

    if let Err(e) = register_table(client, data_source_id, owner_id, plan, collection).await {
        tracing::warn!(
            "Failed to register \"{}\".\"{}\" in the table catalog (continuing): {e}",
            plan.schema_name,
            plan.table_name
        );
    }

    Ok(())
}

async fn table_exists(client: &Client, schema: &str, table: &str) -> anyhow::Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )",
            &[&schema, &table],
        )
        .await
        .context("failed to check destination table existence")?;
    Ok(row.get(0))
}

/// Register the table in the discoverability catalog consumed by the
/// schema/model-builder tooling.
///
/// Idempotent: at most one entry exists per (schema, physical table), so
/// the same call doubles as the backfill check for pre-existing tables.
pub async fn register_table(
    client: &Client,
    data_source_id: i64,
    owner_id: Option<i64>,
    plan: &TablePlan,
    collection: &str,
) -> anyhow::Result<()> {
    client
        .execute(
            "INSERT INTO \"import_table_catalog\"
                (\"data_source_id\", \"owner_id\", \"schema_name\",
                 \"physical_table_name\", \"logical_name\", \"registered_at\")
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (\"schema_name\", \"physical_table_name\") DO NOTHING",
            &[
                &data_source_id,
                &owner_id,
                &plan.schema_name,
                &plan.table_name,
                &collection,
                &chrono::Utc::now(),
            ],
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_excludes_nested_fields() {
        let fields = vec![
            FieldDescriptor::new("name", FieldKind::String),
            FieldDescriptor::new("address", FieldKind::Object),
            FieldDescriptor::new("address.city", FieldKind::String),
        ];
        let columns = build_column_plan(&fields);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "address"]);
    }

    #[test]
    fn test_plan_first_seen_wins_on_sanitization_collision() {
        let fields = vec![
            FieldDescriptor::new("user name", FieldKind::String),
            FieldDescriptor::new("user-name", FieldKind::Integer),
        ];
        let columns = build_column_plan(&fields);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].source_field, "user name");
        assert_eq!(columns[0].kind, FieldKind::String);
    }

    #[test]
    fn test_plan_reserves_engine_columns() {
        let fields = vec![
            FieldDescriptor::new("_imported_at", FieldKind::String),
            FieldDescriptor::new("_raw_document", FieldKind::String),
            FieldDescriptor::new("payload", FieldKind::Object),
        ];
        let columns = build_column_plan(&fields);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["payload"]);
    }

    #[test]
    fn test_table_plan_names_are_sanitized_and_source_scoped() {
        let plan = TablePlan::new("Analytics", "Order Items", 7, &[]);
        assert_eq!(plan.schema_name, "analytics");
        assert_eq!(plan.table_name, "order_items_7");
    }

    #[test]
    fn test_create_statement_for_plan_includes_engine_columns() {
        let plan = TablePlan::new(
            "analytics",
            "orders",
            1,
            &[FieldDescriptor::new("total", FieldKind::Double)],
        );
        let stmt = plan.create_table_statement();
        assert!(stmt.contains("\"_id\""));
        assert!(stmt.contains("\"total\" NUMERIC"));
        assert!(stmt.contains("\"_imported_at\""));
        assert!(stmt.contains("\"_raw_document\""));
    }
}
