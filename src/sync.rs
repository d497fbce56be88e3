//! Data-source import orchestration.
//!
//! [`ImportEngine`] drives a whole run: it enumerates the source's
//! collections, imports them sequentially, aggregates totals, finalizes the
//! persisted data-source status, and guarantees source disconnect plus a
//! final progress emission on every exit path.
//!
//! Each run gets its own explicitly constructed engine instance carrying
//! its destination handle and progress channel, so two concurrent runs
//! never share mutable progress state. A single instance assumes one active
//! run at a time.

use crate::connect::Destination;
use crate::import::{CollectionImporter, ImportOptions};
use crate::progress::{ImportProgress, ProgressChannel, ProgressReporter};
use crate::state;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use sync_core::DocumentSource;

/// Aggregate result of one data-source import run.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    /// Collections enumerated on the source
    pub collections_total: usize,
    /// Records upserted across all collections
    pub records_imported: u64,
    /// Records excluded or rejected across all collections
    pub records_failed: u64,
    /// Wall-clock duration of the run
    pub duration: std::time::Duration,
}

/// The import engine for one data source run.
pub struct ImportEngine {
    destination: Destination,
    channel: Arc<dyn ProgressChannel>,
}

impl ImportEngine {
    /// Create an engine bound to a destination and a progress channel.
    pub fn new(destination: Destination, channel: Arc<dyn ProgressChannel>) -> Self {
        Self {
            destination,
            channel,
        }
    }

    /// Import every collection of `source` sequentially.
    ///
    /// On failure the data source is marked `failed` but collections
    /// already imported keep their data and history records. The source
    /// connection is released and a final progress event is emitted on
    /// every exit path.
    pub async fn import_data_source(
        &self,
        source: &dyn DocumentSource,
        data_source_id: i64,
        owner_id: Option<i64>,
        options: &ImportOptions,
    ) -> anyhow::Result<ImportSummary> {
        let mut progress = ImportProgress::new(data_source_id, owner_id);
        let mut reporter = ProgressReporter::new(self.channel.clone());

        let result = self
            .run(
                source,
                data_source_id,
                owner_id,
                options,
                &mut progress,
                &mut reporter,
            )
            .await;

        if let Err(e) = &result {
            tracing::error!("Import of data source {data_source_id} failed: {e:#}");
            progress.fail_run(e.to_string());
            if !options.dry_run {
                self.mark_failed_best_effort(data_source_id, e).await;
            }
        }

        // Guaranteed cleanup: release the source and publish the terminal
        // progress state regardless of outcome.
        if let Err(e) = source.disconnect().await {
            tracing::warn!("Failed to disconnect source for data source {data_source_id}: {e}");
        }
        reporter.emit(&progress).await;

        result
    }

    async fn run(
        &self,
        source: &dyn DocumentSource,
        data_source_id: i64,
        owner_id: Option<i64>,
        options: &ImportOptions,
        progress: &mut ImportProgress,
        reporter: &mut ProgressReporter,
    ) -> anyhow::Result<ImportSummary> {
        let started = Instant::now();
        let run_started_at = Utc::now();
        tracing::info!("Starting import for data source {data_source_id}");

        let watermark = self
            .initialize_run(data_source_id, options)
            .await
            .context("failed to initialize the import run")?;

        progress.start_run();
        reporter.emit(progress).await;

        let collections = source
            .list_collections()
            .await
            .context("failed to enumerate source collections")?;
        tracing::info!(
            "Found {} collections on data source {data_source_id}",
            collections.len()
        );
        for name in &collections {
            progress.register_collection(name);
        }
        reporter.emit(progress).await;

        let mut records_imported = 0u64;
        let mut records_failed = 0u64;

        for name in &collections {
            progress.start_collection(name);
            reporter.emit(progress).await;

            let mut session = self
                .destination
                .session()
                .await
                .with_context(|| format!("failed to open a session for collection '{name}'"))?;

            let mut importer = CollectionImporter {
                source,
                session: &mut session,
                options,
                data_source_id,
                owner_id,
                watermark,
            };
            let outcome = importer.run(name, progress, reporter).await;
            session.close();

            match outcome {
                Ok(o) => {
                    records_imported += o.records_imported;
                    records_failed += o.records_failed;
                    progress.complete_collection(name);
                }
                Err(e) => {
                    progress.fail_collection(name);
                    return Err(e.context(format!("import of collection '{name}' failed")));
                }
            }
            reporter.emit(progress).await;
        }

        if !options.dry_run {
            let session = self.destination.session().await?;
            state::mark_data_source_completed(
                &session,
                data_source_id,
                records_imported as i64,
                run_started_at,
            )
            .await?;
            session.close();
        }

        progress.complete_run();
        tracing::info!(
            "Import of data source {data_source_id} completed: {records_imported} records \
             across {} collections ({records_failed} failed)",
            collections.len()
        );

        Ok(ImportSummary {
            collections_total: collections.len(),
            records_imported,
            records_failed,
            duration: started.elapsed(),
        })
    }

    /// Bootstrap bookkeeping, read the incremental watermark, and mark the
    /// data source as syncing.
    async fn initialize_run(
        &self,
        data_source_id: i64,
        options: &ImportOptions,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        let session = self.destination.session().await?;
        state::ensure_bookkeeping_tables(&session).await?;

        let watermark = if options.incremental {
            state::last_synced_at(&session, data_source_id).await?
        } else {
            None
        };

        if !options.dry_run {
            state::mark_data_source_syncing(&session, data_source_id).await?;
        }
        session.close();
        Ok(watermark)
    }

    /// Record the failure on the data source row; itself best-effort.
    async fn mark_failed_best_effort(&self, data_source_id: i64, error: &anyhow::Error) {
        match self.destination.session().await {
            Ok(session) => {
                if let Err(e) =
                    state::mark_data_source_failed(&session, data_source_id, &error.to_string())
                        .await
                {
                    tracing::warn!(
                        "Failed to record failure of data source {data_source_id}: {e}"
                    );
                }
                session.close();
            }
            Err(e) => {
                tracing::warn!(
                    "Could not open a session to record failure of data source {data_source_id}: {e}"
                );
            }
        }
    }
}
