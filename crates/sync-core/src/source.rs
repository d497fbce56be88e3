//! Source-side contract consumed by the import engine.
//!
//! A document store driver implements [`DocumentSource`] to expose
//! collection discovery, bounded-sample schema inference, counting, and
//! single-pass cursor streaming. The engine never assumes a stream can be
//! re-iterated or consumed in parallel.

use crate::types::CollectionSchema;
use chrono::{DateTime, Utc};

/// A raw document as handed over by the source driver.
pub type Document = bson::Document;

/// Watermark filter for incremental imports: only documents whose
/// `field` is strictly greater than `after` are considered.
#[derive(Debug, Clone)]
pub struct SyncFilter {
    /// Document field carrying the last-modified timestamp
    pub field: String,
    /// Watermark from the previous successful run
    pub after: DateTime<Utc>,
}

/// Contract implemented by document-store drivers.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    /// Enumerate the collection names available on the source.
    async fn list_collections(&self) -> anyhow::Result<Vec<String>>;

    /// Infer a collection's schema by sampling up to `sample_size`
    /// documents. The native id is excluded from the result.
    async fn infer_schema(
        &self,
        collection: &str,
        sample_size: u32,
    ) -> anyhow::Result<CollectionSchema>;

    /// Count the documents that match the optional incremental filter.
    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&SyncFilter>,
    ) -> anyhow::Result<u64>;

    /// Open a lazy, single-pass stream over the matching documents. The
    /// underlying cursor fetches `batch_size` documents at a time.
    async fn stream_documents(
        &self,
        collection: &str,
        filter: Option<&SyncFilter>,
        batch_size: usize,
    ) -> anyhow::Result<Box<dyn DocumentStream>>;

    /// Release the source connection. Called exactly once per run in the
    /// engine's guaranteed-cleanup step.
    async fn disconnect(&self) -> anyhow::Result<()>;
}

/// A lazy, finite, non-restartable sequence of documents.
#[async_trait::async_trait]
pub trait DocumentStream: Send {
    /// Get the next document from the stream.
    /// Returns None when the stream is exhausted.
    async fn next(&mut self) -> Option<anyhow::Result<Document>>;
}
