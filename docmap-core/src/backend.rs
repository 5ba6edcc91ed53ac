//! Storage backend abstraction for the document client.
//!
//! This module defines the boundary between the client and the document store. The client
//! shapes filters, sort specs, replacement documents and pipelines; a backend executes them.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait provides a unified async interface for the store primitives
//! the client needs: single-document insert, lookup, replace and delete, multi-document
//! lookup and delete, aggregation, and collection management. Backends are created through
//! a [`StoreBackendBuilder`], which is where connection setup and its failures live.
//!
//! Filters, sort specs and pipeline stages are BSON documents in the MongoDB dialect.
//!
//! # Examples
//!
//! ```ignore
//! use docmap::backend::{StoreBackend, StoreBackendBuilder};
//! use docmap::memory::InMemoryStore;
//! use bson::doc;
//!
//! let backend = InMemoryStore::builder().build().await?;
//! backend.insert_document(doc! { "_id": 1, "name": "Alice" }, "users").await?;
//! let found = backend.find_document(doc! { "name": "Alice" }, "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::error::DocumentStoreResult;

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. A client adds no synchronization of its own, so
/// sharing one client across tasks is exactly as safe as sharing the backend.
///
/// # Error Handling
///
/// Backends report their failures verbatim; the client never retries. Duplicate keys map to
/// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists) and
/// other store failures to [`Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts one document into a collection.
    ///
    /// The document must carry its `_id`. The collection is created on first insert.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// if a document with the same `_id` is already stored.
    async fn insert_document(
        &self,
        document: Document,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Returns the first document matching `filter`, or `None`.
    async fn find_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns every document matching `filter`, ordered by `sort` when given.
    async fn find_documents(
        &self,
        filter: Document,
        sort: Option<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Replaces at most one document matching `filter` with `replacement`.
    ///
    /// The replaced document keeps its `_id`. Nothing is inserted when no document matches.
    /// Which document is replaced when several match is store-dependent.
    ///
    /// # Returns
    ///
    /// The number of matched documents (`0` or `1`).
    async fn replace_document(
        &self,
        filter: Document,
        replacement: Document,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Deletes at most one document matching `filter` and returns the number deleted.
    async fn delete_document(
        &self,
        filter: Document,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Runs an aggregation pipeline over a collection.
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Lists the names of all collections in the database.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Creates a new, empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionAlreadyExists`](crate::error::DocumentStoreError::CollectionAlreadyExists)
    /// if the collection is already present.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection and all its documents.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the collection does not exist.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory for backends. Building a backend establishes its connection.
#[async_trait]
pub trait StoreBackendBuilder: Send {
    type Backend: StoreBackend;

    /// Connects and returns the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Initialization`](crate::error::DocumentStoreError::Initialization) if the
    /// connection string is malformed or the store is unreachable.
    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
