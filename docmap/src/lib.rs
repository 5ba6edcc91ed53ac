//! Main docmap crate providing a small object-document mapper over document stores.
//!
//! This crate is the primary entry point for users of docmap. It re-exports the core
//! types, the `Record` derive and the available storage backends.
//!
//! # Features
//!
//! - **Typed records** - Plain Serde structs with `#[derive(Record)]` marking the identifier and slug
//! - **Identifier lifecycle** - Identifiers are generated on insert and validated before any store call
//! - **Slug lookups** - Read or delete by identifier text or by a human readable slug
//! - **Aggregation** - Grouped and redacted pipelines with an optional sort stage
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! pub struct HelloWorld {
//!     #[record(id)]
//!     #[serde(rename = "_id")]
//!     pub id: ObjectId,
//!     #[record(slug)]
//!     pub name: String,
//!     pub value: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let mut client = DocumentClient::new();
//!     client.connect(InMemoryStore::builder(), "testCollection").await?;
//!
//!     let mut record = HelloWorld {
//!         id: ObjectId::default(),
//!         name: "world".to_string(),
//!         value: "Hello".to_string(),
//!     };
//!
//!     // The generated identifier is written back into the record
//!     let id = client.insert(&mut record).await?;
//!
//!     // Identifier text and slugs both resolve
//!     let by_id: HelloWorld = client.read_by_slug(&id.to_hex()).await?;
//!     let by_slug: HelloWorld = client.read_by_slug("world").await?;
//!     assert_eq!(by_id.id, by_slug.id);
//!
//!     // Group and count by value
//!     let counts: Vec<bson::Document> = client
//!         .find_grouped(
//!             &bson::doc! {},
//!             bson::doc! { "_id": "$value", "count": { "$sum": 1 } },
//!             bson::doc! { "_id": 1 },
//!         )
//!         .await?;
//!
//!     println!("{counts:?}");
//!
//!     client.close().await
//! }
//! ```
//!
//! # Embedded Records
//!
//! A record can embed another record and take its identifier and slug from it:
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! pub struct Hello {
//!     #[record(inline)]
//!     #[serde(flatten)]
//!     pub world: HelloWorld,
//!     pub greeting: String,
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docmap;

pub mod prelude;

pub use docmap_core::{backend, client, config, error, identifier, pipeline, query, record};
pub use docmap_macros::Record;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmap_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmap_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
