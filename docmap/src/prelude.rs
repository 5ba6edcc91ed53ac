//! Convenient re-exports of commonly used types from docmap.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The `Record` trait, its derive and the identifier type
//! - The document client and its configuration
//! - Store backends and builders
//! - Filter and sort construction
//! - Error types

pub use docmap_core::{
    record::{Record, RecordExt, IdentifierDescriptor, SlugDescriptor},
    identifier::ObjectId,
    client::{DocumentClient, ClientStatus},
    config::ClientConfig,
    backend::{StoreBackend, StoreBackendBuilder},
    query::{Expr, Filter, FieldOp, Sort, SortDirection},
    pipeline::Pipeline,
    error::{DocumentStoreError, DocumentStoreResult},
};
pub use docmap_macros::Record;
