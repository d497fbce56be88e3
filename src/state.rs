//! Persisted engine state.
//!
//! Two kinds of durable bookkeeping live in the destination database: one
//! sync-history row per collection-import attempt, and the status/timestamp
//! columns on the parent data source record. History rows transition
//! exactly once from `in_progress` to a terminal status.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::Client;

/// Status of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of sync a history row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    Incremental,
}

impl SyncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Incremental => "incremental",
        }
    }
}

const SYNC_HISTORY_DDL: &str = "
CREATE TABLE IF NOT EXISTS \"sync_history\" (
  \"id\" BIGSERIAL PRIMARY KEY,
  \"data_source_id\" BIGINT NOT NULL,
  \"collection_name\" TEXT NOT NULL,
  \"table_name\" TEXT NOT NULL,
  \"sync_type\" TEXT NOT NULL,
  \"status\" TEXT NOT NULL,
  \"records_synced\" BIGINT NOT NULL DEFAULT 0,
  \"records_failed\" BIGINT NOT NULL DEFAULT 0,
  \"error_message\" TEXT,
  \"started_at\" TIMESTAMPTZ NOT NULL,
  \"completed_at\" TIMESTAMPTZ
);";

const TABLE_CATALOG_DDL: &str = "
CREATE TABLE IF NOT EXISTS \"import_table_catalog\" (
  \"id\" BIGSERIAL PRIMARY KEY,
  \"data_source_id\" BIGINT NOT NULL,
  \"owner_id\" BIGINT,
  \"schema_name\" TEXT NOT NULL,
  \"physical_table_name\" TEXT NOT NULL,
  \"logical_name\" TEXT NOT NULL,
  \"registered_at\" TIMESTAMPTZ NOT NULL,
  UNIQUE (\"schema_name\", \"physical_table_name\")
);";

const DATA_SOURCES_DDL: &str = "
CREATE TABLE IF NOT EXISTS \"data_sources\" (
  \"id\" BIGINT PRIMARY KEY,
  \"last_sync_status\" TEXT,
  \"last_sync_error\" TEXT,
  \"last_synced_at\" TIMESTAMPTZ,
  \"total_records_synced\" BIGINT
);";

/// Create the engine's bookkeeping tables when they do not exist yet, so a
/// fresh destination database works without out-of-band migrations.
pub async fn ensure_bookkeeping_tables(client: &Client) -> anyhow::Result<()> {
    client
        .batch_execute(SYNC_HISTORY_DDL)
        .await
        .context("failed to create sync_history table")?;
    client
        .batch_execute(TABLE_CATALOG_DDL)
        .await
        .context("failed to create import_table_catalog table")?;
    client
        .batch_execute(DATA_SOURCES_DDL)
        .await
        .context("failed to create data_sources table")?;
    Ok(())
}

/// Insert the `in_progress` history row for a collection import attempt.
pub async fn record_sync_start(
    client: &Client,
    data_source_id: i64,
    collection: &str,
    table_name: &str,
    sync_type: SyncType,
) -> anyhow::Result<i64> {
    let row = client
        .query_one(
            "INSERT INTO \"sync_history\"
                (\"data_source_id\", \"collection_name\", \"table_name\",
                 \"sync_type\", \"status\", \"started_at\")
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING \"id\"",
            &[
                &data_source_id,
                &collection,
                &table_name,
                &sync_type.as_str(),
                &SyncStatus::InProgress.as_str(),
                &Utc::now(),
            ],
        )
        .await
        .context("failed to record sync start")?;
    Ok(row.get(0))
}

/// Transition a history row to `completed` with its final counts.
pub async fn record_sync_success(
    client: &Client,
    history_id: i64,
    records_synced: i64,
    records_failed: i64,
) -> anyhow::Result<()> {
    finish_sync_record(
        client,
        history_id,
        SyncStatus::Completed,
        records_synced,
        records_failed,
        None,
    )
    .await
}

/// Transition a history row to `failed` with the error message.
pub async fn record_sync_failure(
    client: &Client,
    history_id: i64,
    error: &str,
) -> anyhow::Result<()> {
    finish_sync_record(client, history_id, SyncStatus::Failed, 0, 0, Some(error)).await
}

async fn finish_sync_record(
    client: &Client,
    history_id: i64,
    status: SyncStatus,
    records_synced: i64,
    records_failed: i64,
    error: Option<&str>,
) -> anyhow::Result<()> {
    let updated = client
        .execute(
            "UPDATE \"sync_history\"
             SET \"status\" = $2, \"records_synced\" = $3, \"records_failed\" = $4,
                 \"error_message\" = $5, \"completed_at\" = $6
             WHERE \"id\" = $1 AND \"status\" = $7",
            &[
                &history_id,
                &status.as_str(),
                &records_synced,
                &records_failed,
                &error,
                &Utc::now(),
                &SyncStatus::InProgress.as_str(),
            ],
        )
        .await
        .context("failed to finalize sync history record")?;

    if updated == 0 {
        tracing::warn!(
            "Sync history record {history_id} was already terminal, not overwriting with {status}"
        );
    }
    Ok(())
}

/// Mark the data source as actively syncing.
pub async fn mark_data_source_syncing(client: &Client, data_source_id: i64) -> anyhow::Result<()> {
    upsert_data_source_status(client, data_source_id, SyncStatus::InProgress, None, None, None)
        .await
}

/// Mark the data source completed, recording totals and the watermark for
/// the next incremental run.
pub async fn mark_data_source_completed(
    client: &Client,
    data_source_id: i64,
    total_records: i64,
    synced_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    upsert_data_source_status(
        client,
        data_source_id,
        SyncStatus::Completed,
        None,
        Some(synced_at),
        Some(total_records),
    )
    .await
}

/// Mark the data source failed with the run's error message.
pub async fn mark_data_source_failed(
    client: &Client,
    data_source_id: i64,
    error: &str,
) -> anyhow::Result<()> {
    upsert_data_source_status(
        client,
        data_source_id,
        SyncStatus::Failed,
        Some(error),
        None,
        None,
    )
    .await
}

async fn upsert_data_source_status(
    client: &Client,
    data_source_id: i64,
    status: SyncStatus,
    error: Option<&str>,
    synced_at: Option<DateTime<Utc>>,
    total_records: Option<i64>,
) -> anyhow::Result<()> {
    client
        .execute(
            "INSERT INTO \"data_sources\"
                (\"id\", \"last_sync_status\", \"last_sync_error\",
                 \"last_synced_at\", \"total_records_synced\")
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (\"id\") DO UPDATE SET
                \"last_sync_status\" = EXCLUDED.\"last_sync_status\",
                \"last_sync_error\" = EXCLUDED.\"last_sync_error\",
                \"last_synced_at\" = COALESCE(EXCLUDED.\"last_synced_at\", \"data_sources\".\"last_synced_at\"),
                \"total_records_synced\" = COALESCE(EXCLUDED.\"total_records_synced\", \"data_sources\".\"total_records_synced\")",
            &[&data_source_id, &status.as_str(), &error, &synced_at, &total_records],
        )
        .await
        .with_context(|| format!("failed to update sync status of data source {data_source_id}"))?;
    Ok(())
}

/// Read the watermark persisted by the last successful run, if any.
pub async fn last_synced_at(
    client: &Client,
    data_source_id: i64,
) -> anyhow::Result<Option<DateTime<Utc>>> {
    let row = client
        .query_opt(
            "SELECT \"last_synced_at\" FROM \"data_sources\" WHERE \"id\" = $1",
            &[&data_source_id],
        )
        .await
        .context("failed to read the last-sync watermark")?;
    Ok(row.and_then(|r| r.get(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(SyncStatus::InProgress.as_str(), "in_progress");
        assert_eq!(SyncStatus::Completed.as_str(), "completed");
        assert_eq!(SyncStatus::Failed.as_str(), "failed");
        assert_eq!(SyncType::Full.as_str(), "full");
        assert_eq!(SyncType::Incremental.as_str(), "incremental");
    }

    #[test]
    fn test_status_serde_matches_persisted_form() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(serde_json::to_string(&SyncType::Full).unwrap(), "\"full\"");
    }

    #[test]
    fn test_bookkeeping_ddl_is_idempotent() {
        for ddl in [SYNC_HISTORY_DDL, TABLE_CATALOG_DDL, DATA_SOURCES_DDL] {
            assert!(ddl.contains("IF NOT EXISTS"));
        }
    }
}
