//! Per-collection import driver.
//!
//! Drives one collection end to end: schema inference, destination table
//! setup, counting, adaptive batch sizing, cursor streaming into the batch
//! writer, progress updates, and sync-history bookkeeping.

use crate::connect::PgSession;
use crate::progress::{ImportProgress, ProgressReporter};
use crate::state::{self, SyncType};
use crate::table::{ensure_table, TablePlan};
use crate::write::{write_batch, BatchOutcome};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sync_core::{Document, DocumentSource, SyncFilter};

/// Default number of documents per write batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Lower bound applied when adaptive sizing shrinks the batch.
pub const MIN_BATCH_SIZE: usize = 100;

/// Options governing one data-source import run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Destination schema for import tables
    pub schema_name: String,
    /// Base batch size for data migration
    pub batch_size: usize,
    /// Scale the batch size to the collection's document count
    pub adaptive_batching: bool,
    /// Only import documents newer than the last-sync watermark
    pub incremental: bool,
    /// Document field carrying the last-modified timestamp
    pub last_sync_field: Option<String>,
    /// Documents sampled per collection for schema inference
    pub sample_size: u32,
    /// Dry run mode - don't actually write data
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            schema_name: "analytics".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            adaptive_batching: true,
            incremental: false,
            last_sync_field: None,
            sample_size: mongo_pg_sync_mongodb_source::DEFAULT_SAMPLE_SIZE,
            dry_run: false,
        }
    }
}

/// Outcome of one collection import.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionOutcome {
    /// Records upserted into the destination table
    pub records_imported: u64,
    /// Records excluded or rejected
    pub records_failed: u64,
}

/// Pick a batch size from the collection's total document count.
///
/// Small collections get larger batches for throughput; large collections
/// get smaller ones to bound memory. The band multipliers are
/// non-increasing as the total grows.
pub fn adaptive_batch_size(total_documents: u64, default: usize) -> usize {
    let default = default.max(1);
    match total_documents {
        0..=999 => (default * 2).min(total_documents.max(1) as usize),
        1_000..=9_999 => default * 2,
        10_000..=99_999 => default,
        100_000..=999_999 => (default / 2).max(MIN_BATCH_SIZE),
        _ => (default / 4).max(MIN_BATCH_SIZE),
    }
}

/// Imports one collection into its destination table.
pub(crate) struct CollectionImporter<'a> {
    pub source: &'a dyn DocumentSource,
    pub session: &'a mut PgSession,
    pub options: &'a ImportOptions,
    pub data_source_id: i64,
    pub owner_id: Option<i64>,
    /// Watermark from the last successful run, for incremental filtering
    pub watermark: Option<DateTime<Utc>>,
}

impl CollectionImporter<'_> {
    /// Run the import for `collection`, returning its outcome.
    ///
    /// Schema-empty collections are skipped as no-op successes. Inference
    /// and DDL errors abort the collection and propagate to the
    /// orchestrator; per-document failures only increment the failed count.
    pub async fn run(
        &mut self,
        collection: &str,
        progress: &mut ImportProgress,
        reporter: &mut ProgressReporter,
    ) -> anyhow::Result<CollectionOutcome> {
        tracing::info!("Importing collection '{collection}'");

        let schema = self
            .source
            .infer_schema(collection, self.options.sample_size)
            .await
            .with_context(|| format!("schema inference failed for collection '{collection}'"))?;

        if schema.is_empty() {
            tracing::info!("Collection '{collection}' has no inferable fields, skipping");
            progress.set_collection_total(collection, 0);
            return Ok(CollectionOutcome::default());
        }

        let plan = TablePlan::new(
            &self.options.schema_name,
            collection,
            self.data_source_id,
            &schema.fields,
        );

        let history_id = if self.options.dry_run {
            None
        } else {
            Some(
                state::record_sync_start(
                    self.session,
                    self.data_source_id,
                    collection,
                    &plan.table_name,
                    self.sync_type(),
                )
                .await?,
            )
        };

        let result = self
            .import_documents(collection, &plan, progress, reporter)
            .await;

        match result {
            Ok(outcome) => {
                if let Some(id) = history_id {
                    state::record_sync_success(
                        self.session,
                        id,
                        outcome.records_imported as i64,
                        outcome.records_failed as i64,
                    )
                    .await?;
                }
                tracing::info!(
                    "Completed import of collection '{collection}': {} records, {} failed",
                    outcome.records_imported,
                    outcome.records_failed
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Some(id) = history_id {
                    if let Err(e2) =
                        state::record_sync_failure(self.session, id, &e.to_string()).await
                    {
                        tracing::warn!("Failed to record sync failure for '{collection}': {e2}");
                    }
                }
                Err(e)
            }
        }
    }

    async fn import_documents(
        &mut self,
        collection: &str,
        plan: &TablePlan,
        progress: &mut ImportProgress,
        reporter: &mut ProgressReporter,
    ) -> anyhow::Result<CollectionOutcome> {
        if !self.options.dry_run {
            ensure_table(
                self.session,
                plan,
                self.data_source_id,
                self.owner_id,
                collection,
            )
            .await?;
        }

        let filter = self.sync_filter();
        let total = self
            .source
            .count_documents(collection, filter.as_ref())
            .await
            .with_context(|| format!("failed to count documents in '{collection}'"))?;
        progress.set_collection_total(collection, total);

        let batch_size = if self.options.adaptive_batching {
            adaptive_batch_size(total, self.options.batch_size)
        } else {
            self.options.batch_size.max(1)
        };
        tracing::info!(
            "Collection '{collection}' has {total} applicable documents, batch size {batch_size}"
        );

        if total == 0 {
            return Ok(CollectionOutcome::default());
        }

        let mut stream = self
            .source
            .stream_documents(collection, filter.as_ref(), batch_size)
            .await?;

        let mut outcome = CollectionOutcome::default();
        let mut batch: Vec<Document> = Vec::with_capacity(batch_size);

        while let Some(document) = stream.next().await {
            batch.push(document?);
            if batch.len() >= batch_size {
                self.flush_batch(collection, plan, &batch, &mut outcome, progress, reporter)
                    .await?;
                tracing::debug!(
                    "Processed {}/{} documents from '{collection}'",
                    outcome.records_imported + outcome.records_failed,
                    total
                );
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.flush_batch(collection, plan, &batch, &mut outcome, progress, reporter)
                .await?;
        }

        Ok(outcome)
    }

    async fn flush_batch(
        &mut self,
        collection: &str,
        plan: &TablePlan,
        batch: &[Document],
        outcome: &mut CollectionOutcome,
        progress: &mut ImportProgress,
        reporter: &mut ProgressReporter,
    ) -> anyhow::Result<()> {
        let result = if self.options.dry_run {
            tracing::debug!(
                "Dry-run: would upsert {} documents into \"{}\"",
                batch.len(),
                plan.table_name
            );
            BatchOutcome {
                success_count: batch.len(),
                failed_count: 0,
            }
        } else {
            write_batch(self.session, plan, batch).await?
        };

        outcome.records_imported += result.success_count as u64;
        outcome.records_failed += result.failed_count as u64;
        progress.record_batch(
            collection,
            result.success_count as u64,
            result.failed_count as u64,
        );
        reporter.emit_throttled(progress).await;
        Ok(())
    }

    fn sync_type(&self) -> SyncType {
        if self.options.incremental {
            SyncType::Incremental
        } else {
            SyncType::Full
        }
    }

    fn sync_filter(&self) -> Option<SyncFilter> {
        if !self.options.incremental {
            return None;
        }
        match (&self.options.last_sync_field, self.watermark) {
            (Some(field), Some(after)) => Some(SyncFilter {
                field: field.clone(),
                after,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_batch_caps_very_small_collections_at_their_size() {
        assert_eq!(adaptive_batch_size(500, DEFAULT_BATCH_SIZE), 500);
        assert_eq!(adaptive_batch_size(999, 400), 800);
    }

    #[test]
    fn test_adaptive_batch_bands() {
        assert_eq!(adaptive_batch_size(5_000, 1000), 2000);
        assert_eq!(adaptive_batch_size(50_000, 1000), 1000);
        assert_eq!(adaptive_batch_size(500_000, 1000), 500);
        assert_eq!(adaptive_batch_size(2_000_000, 1000), 250);
    }

    #[test]
    fn test_adaptive_batch_band_multipliers_are_non_increasing() {
        let default = 1000;
        let bands = [
            adaptive_batch_size(5_000, default),
            adaptive_batch_size(50_000, default),
            adaptive_batch_size(500_000, default),
            adaptive_batch_size(5_000_000, default),
        ];
        assert!(bands.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_adaptive_batch_smaller_collection_gets_larger_batch() {
        let small = adaptive_batch_size(500, DEFAULT_BATCH_SIZE);
        let huge = adaptive_batch_size(2_000_000, DEFAULT_BATCH_SIZE);
        assert!(small > huge);
    }

    #[test]
    fn test_adaptive_batch_respects_lower_bound() {
        assert_eq!(adaptive_batch_size(10_000_000, 200), MIN_BATCH_SIZE);
        assert_eq!(adaptive_batch_size(0, 1000), 1);
    }

    #[test]
    fn test_default_options() {
        let options = ImportOptions::default();
        assert_eq!(options.schema_name, "analytics");
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert!(options.adaptive_batching);
        assert!(!options.incremental);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ImportOptions =
            serde_json::from_str("{\"batch_size\": 250, \"incremental\": true}").unwrap();
        assert_eq!(options.batch_size, 250);
        assert!(options.incremental);
        assert_eq!(options.schema_name, "analytics");
    }
}
