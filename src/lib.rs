//! mongo-pg-sync
//!
//! An engine for importing and synchronizing MongoDB collections into
//! PostgreSQL analytics schemas.
//!
//! # Features
//!
//! - Collection discovery and bounded-sample schema inference
//! - Lazy destination table creation with identifier sanitization
//! - Transactional bulk upserts with an automatic row-by-row fallback
//! - Adaptive batch sizing bounded by collection size
//! - Incremental imports filtered by a last-sync watermark
//! - Throttled, ETA-aware progress publication
//!
//! # Usage
//!
//! The engine is invoked programmatically; there is no CLI surface. A run
//! imports every collection of one data source sequentially:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mongo_pg_sync::{
//!     BroadcastProgressChannel, Destination, ImportEngine, ImportOptions,
//! };
//! use mongo_pg_sync::mongodb_source::{MongoSource, SourceOpts};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let source = MongoSource::connect(&SourceOpts {
//!     source_uri: "mongodb://localhost:27017".to_string(),
//!     source_database: "appdata".to_string(),
//! })
//! .await?;
//!
//! let channel = Arc::new(BroadcastProgressChannel::new(64));
//! let engine = ImportEngine::new(
//!     Destination::new("host=localhost user=postgres dbname=analytics"),
//!     channel,
//! );
//!
//! let summary = engine
//!     .import_data_source(&source, 42, Some(7), &ImportOptions::default())
//!     .await?;
//! println!("imported {} records", summary.records_imported);
//! # Ok(())
//! # }
//! ```

pub mod connect;
pub mod flatten;
pub mod import;
pub mod progress;
pub mod state;
pub mod sync;
pub mod table;
pub mod write;

// Re-export the MongoDB source driver for convenience
pub use mongo_pg_sync_mongodb_source as mongodb_source;

pub use connect::{Destination, PgSession};
pub use flatten::{flatten_document, FlattenedRow};
pub use import::{adaptive_batch_size, CollectionOutcome, ImportOptions, DEFAULT_BATCH_SIZE};
pub use progress::{
    BroadcastProgressChannel, CollectionStatus, ImportProgress, ProgressChannel, ProgressEvent,
    ProgressReporter, ProgressTarget, RunStatus, PROGRESS_EVENT,
};
pub use sync::{ImportEngine, ImportSummary};
pub use table::{build_column_plan, ensure_table, register_table, PlannedColumn, TablePlan};
pub use write::{write_batch, BatchOutcome};

// Re-export core types used throughout the public API
pub use sync_core::{
    CollectionSchema, ColumnValue, Document, DocumentSource, DocumentStream, FieldDescriptor,
    FieldKind, FlattenError, SyncFilter,
};
