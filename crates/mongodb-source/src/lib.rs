//! MongoDB document-store driver for mongo-pg-sync.
//!
//! Implements the engine's [`DocumentSource`] contract on top of the
//! official MongoDB driver: collection enumeration, bounded-sample schema
//! inference, counting with incremental watermark filters, and single-pass
//! cursor streaming.

use mongodb::{bson::doc, options::ClientOptions, Client as MongoClient, Cursor, Database};
use std::time::Duration;
use sync_core::{CollectionSchema, Document, DocumentSource, DocumentStream, SyncFilter};

pub mod schema;

pub use schema::DEFAULT_SAMPLE_SIZE;

/// Source database connection options.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct SourceOpts {
    /// MongoDB connection URI
    pub source_uri: String,
    /// Database to import collections from
    pub source_database: String,
}

/// A connected MongoDB source.
pub struct MongoSource {
    client: MongoClient,
    database: Database,
}

impl MongoSource {
    /// Connect to the source described by `opts`.
    ///
    /// Connect and server-selection timeouts are applied so an unreachable
    /// source fails the run promptly instead of hanging.
    pub async fn connect(opts: &SourceOpts) -> anyhow::Result<Self> {
        tracing::debug!("Parsing MongoDB connection options from URI");
        let mut mongo_options = ClientOptions::parse(&opts.source_uri).await?;
        mongo_options.connect_timeout = Some(Duration::from_secs(10));
        mongo_options.server_selection_timeout = Some(Duration::from_secs(10));

        let client = MongoClient::with_options(mongo_options)?;
        let database = client.database(&opts.source_database);
        tracing::info!("Connected to MongoDB database '{}'", opts.source_database);

        Ok(Self { client, database })
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.database
    }
}

/// Translate the optional incremental filter into a MongoDB query document.
fn filter_query(filter: Option<&SyncFilter>) -> Document {
    match filter {
        Some(f) => doc! { &f.field: { "$gt": bson::DateTime::from_chrono(f.after) } },
        None => doc! {},
    }
}

#[async_trait::async_trait]
impl DocumentSource for MongoSource {
    async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        let names = self.database.list_collection_names().await?;
        tracing::debug!("Source database has {} collections", names.len());
        Ok(names)
    }

    async fn infer_schema(
        &self,
        collection: &str,
        sample_size: u32,
    ) -> anyhow::Result<CollectionSchema> {
        schema::infer_collection_schema(&self.database, collection, sample_size).await
    }

    async fn count_documents(
        &self,
        collection: &str,
        filter: Option<&SyncFilter>,
    ) -> anyhow::Result<u64> {
        let coll = self.database.collection::<Document>(collection);
        let count = coll.count_documents(filter_query(filter)).await?;
        Ok(count)
    }

    async fn stream_documents(
        &self,
        collection: &str,
        filter: Option<&SyncFilter>,
        batch_size: usize,
    ) -> anyhow::Result<Box<dyn DocumentStream>> {
        let coll = self.database.collection::<Document>(collection);
        let cursor = coll
            .find(filter_query(filter))
            .batch_size(batch_size as u32)
            .await?;
        Ok(Box::new(MongoDocumentStream { cursor }))
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        tracing::debug!("Shutting down MongoDB client");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Single-pass stream over a MongoDB cursor.
struct MongoDocumentStream {
    cursor: Cursor<Document>,
}

#[async_trait::async_trait]
impl DocumentStream for MongoDocumentStream {
    async fn next(&mut self) -> Option<anyhow::Result<Document>> {
        match self.cursor.advance().await {
            Ok(true) => {
                let doc: Result<Document, _> = self.cursor.current().try_into();
                Some(doc.map_err(Into::into))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_filter_query_without_watermark_matches_everything() {
        assert_eq!(filter_query(None), doc! {});
    }

    #[test]
    fn test_filter_query_with_watermark_uses_gt() {
        let after = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let filter = SyncFilter {
            field: "updated_at".to_string(),
            after,
        };
        let query = filter_query(Some(&filter));
        let clause = query.get_document("updated_at").unwrap();
        assert_eq!(
            clause.get_datetime("$gt").unwrap(),
            &bson::DateTime::from_chrono(after)
        );
    }
}
