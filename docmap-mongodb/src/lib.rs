//! MongoDB backend implementation for docmap.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters, sort specs and pipelines are passed to the server unchanged.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmap = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! Building the backend parses the connection string, connects and pings the server.
//! Connection failures surface as `Initialization` errors from
//! [`DocumentClient::connect`](docmap_core::client::DocumentClient::connect).
//!
//! # Example
//!
//! ```ignore
//! use docmap::{prelude::*, mongodb::MongoDbStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("mongodb://localhost:27017", "local", "testCollection");
//!     let builder = MongoDbStoreBuilder::from_config(&config)?;
//!
//!     let mut client = DocumentClient::connected(builder, &config.collection).await?;
//!     client.create_collection_if_absent().await?;
//!     client.close().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
