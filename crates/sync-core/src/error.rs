//! Typed error classes the engine recovers from per document or per row.

/// Error flattening a single document into a destination row.
///
/// A document that fails to flatten is excluded from its batch and counted
/// as a failed record; it never aborts the batch or the collection.
#[derive(Debug, thiserror::Error)]
pub enum FlattenError {
    /// The document carries no native id field
    #[error("document is missing the native _id field")]
    MissingId,

    /// The native id has a type that cannot become a primary key
    #[error("unsupported _id type in document: {0}")]
    UnsupportedId(String),
}
