//! Core types for the mongo-pg-sync import engine.
//!
//! This crate provides the foundational types shared by the engine and the
//! source drivers, including:
//!
//! - [`FieldKind`] - Tagged union of inferred document field kinds
//! - [`CollectionSchema`] / [`FieldDescriptor`] - Sampled collection schemas
//! - [`ColumnValue`] - Typed column values bound into parameterized statements
//! - [`DocumentSource`] / [`DocumentStream`] - The source-side contract
//! - Identifier sanitization and DDL/DML statement generation
//!
//! # Architecture
//!
//! sync-core sits at the foundation of the import engine:
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── mongodb-source   (implements DocumentSource for MongoDB)
//!    │
//!    └─── mongo-pg-sync    (the engine: flattening, table management,
//!                           batch writing, progress, orchestration)
//! ```

pub mod ddl;
pub mod error;
pub mod idents;
pub mod source;
pub mod types;
pub mod values;

// Re-exports for convenience
pub use ddl::{
    column_type, create_table_statement, upsert_statement, ID_COLUMN, IMPORTED_AT_COLUMN,
    RAW_DOCUMENT_COLUMN,
};
pub use error::FlattenError;
pub use idents::{physical_table_name, quote_ident, sanitize_identifier, PG_MAX_IDENTIFIER_LEN};
pub use source::{Document, DocumentSource, DocumentStream, SyncFilter};
pub use types::{CollectionSchema, FieldDescriptor, FieldKind};
pub use values::ColumnValue;
