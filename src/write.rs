//! Transactional batch writing.
//!
//! A batch is written as one multi-row upsert inside one transaction. If
//! the bulk statement fails (a single malformed value anywhere in the
//! batch is enough), the whole transaction is rolled back and the batch is
//! replayed row by row under savepoints, so one bad row never causes the
//! rest of the batch to be lost.

use crate::flatten::{flatten_document, FlattenedRow};
use crate::table::TablePlan;
use chrono::Utc;
use sync_core::{upsert_statement, Document};
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Outcome of writing one batch.
///
/// `success_count + failed_count` always equals the input batch size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Documents upserted successfully
    pub success_count: usize,
    /// Documents excluded (flatten failures) or rejected (row failures)
    pub failed_count: usize,
}

/// Upsert a batch of documents into the plan's destination table.
pub async fn write_batch(
    client: &mut Client,
    plan: &TablePlan,
    documents: &[Document],
) -> anyhow::Result<BatchOutcome> {
    let imported_at = Utc::now();

    let mut rows: Vec<FlattenedRow> = Vec::with_capacity(documents.len());
    let mut failed_count = 0;
    for doc in documents {
        match flatten_document(doc, plan, imported_at) {
            Ok(row) => rows.push(row),
            Err(e) => {
                failed_count += 1;
                tracing::warn!(
                    "Excluding document from batch for \"{}\": {e}",
                    plan.table_name
                );
            }
        }
    }

    if rows.is_empty() {
        return Ok(BatchOutcome {
            success_count: 0,
            failed_count,
        });
    }

    let data_columns = plan.data_column_names();
    let stmt = upsert_statement(&plan.schema_name, &plan.table_name, &data_columns, rows.len());

    let mut params: Vec<&(dyn ToSql + Sync)> =
        Vec::with_capacity(rows.len() * (data_columns.len() + 3));
    for row in &rows {
        bind_row(row, &mut params);
    }

    let transaction = client.transaction().await?;
    match transaction.execute(stmt.as_str(), &params).await {
        Ok(_) => {
            transaction.commit().await?;
            tracing::debug!(
                "Bulk upserted {} rows into \"{}\"",
                rows.len(),
                plan.table_name
            );
            Ok(BatchOutcome {
                success_count: rows.len(),
                failed_count,
            })
        }
        Err(e) => {
            tracing::warn!(
                "Bulk upsert of {} rows into \"{}\" failed, retrying row by row: {e}",
                rows.len(),
                plan.table_name
            );
            transaction.rollback().await?;
            let (success_count, row_failures) =
                write_rows_individually(client, plan, &rows).await?;
            Ok(BatchOutcome {
                success_count,
                failed_count: failed_count + row_failures,
            })
        }
    }
}

/// Replay a failed batch one row at a time.
///
/// All rows share one transaction; each row runs under its own savepoint so
/// a failing row rolls back alone without discarding earlier successes.
async fn write_rows_individually(
    client: &mut Client,
    plan: &TablePlan,
    rows: &[FlattenedRow],
) -> anyhow::Result<(usize, usize)> {
    let stmt = upsert_statement(&plan.schema_name, &plan.table_name, &plan.data_column_names(), 1);

    let mut transaction = client.transaction().await?;
    let mut success_count = 0;
    let mut failed_count = 0;

    for (i, row) in rows.iter().enumerate() {
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(row.values.len() + 3);
        bind_row(row, &mut params);

        let savepoint = transaction.savepoint(format!("row_{i}")).await?;
        match savepoint.execute(stmt.as_str(), &params).await {
            Ok(_) => {
                savepoint.commit().await?;
                success_count += 1;
            }
            Err(e) => {
                savepoint.rollback().await?;
                failed_count += 1;
                tracing::warn!(
                    "Row upsert failed for id '{}' in \"{}\": {e}",
                    row.id,
                    plan.table_name
                );
            }
        }
    }

    transaction.commit().await?;
    tracing::debug!(
        "Row-by-row fallback for \"{}\" committed {} rows, rejected {}",
        plan.table_name,
        success_count,
        failed_count
    );
    Ok((success_count, failed_count))
}

/// Push one row's parameters in statement order: id, data columns,
/// import timestamp, raw document.
fn bind_row<'a>(row: &'a FlattenedRow, params: &mut Vec<&'a (dyn ToSql + Sync)>) {
    params.push(&row.id);
    for value in &row.values {
        params.push(value);
    }
    params.push(&row.imported_at);
    params.push(&row.raw_document);
}
