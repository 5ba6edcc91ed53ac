//! In-memory document storage backend for docmap.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **MongoDB filter dialect** - Filter documents with comparison, membership, regex and logical operators
//! - **Aggregation** - `$match`, `$group`, `$sort`, `$redact`, `$limit` and `$skip` stages
//! - **Shared state** - Clones and builders seeded with a store share the same data
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! pub struct User {
//!     #[record(id)]
//!     #[serde(rename = "_id")]
//!     pub id: ObjectId,
//!     #[record(slug)]
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = DocumentClient::connected(InMemoryStore::builder(), "users").await?;
//!
//!     let mut user = User { id: ObjectId::default(), name: "alice".to_string() };
//!     client.insert(&mut user).await?;
//!
//!     let found: User = client.read_by_slug("alice").await?;
//!     assert_eq!(found.id, user.id);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

pub mod store;
mod aggregate;
mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
