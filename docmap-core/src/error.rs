//! Error types and result types for document client operations.
//!
//! This module provides error handling for every layer of the crate: record definitions,
//! caller input, client lifecycle and the storage backend.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// The variants fall into five groups:
///
/// - **Configuration** - a record type cannot be used for the requested operation
/// - **Input** - caller supplied text that is not a well-formed identifier
/// - **State** - the client is not connected
/// - **Not found** - the expected document does not exist (recoverable)
/// - **Store** - failures passed through verbatim from the backend
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between records and documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The store could not be reached or the connection string is malformed.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The record type lacks a role field required by the operation.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Caller supplied text that does not parse as an identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The record carries no valid identifier but the operation needs a known target.
    /// The argument is the collection name.
    #[error("Missing identifier for update in collection {0}")]
    MissingIdentifier(String),
    /// The operation was attempted while the client is unbound or closed.
    #[error("Invalid client state: {0}")]
    InvalidState(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// No document matched the lookup.
    /// The first argument describes the lookup, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The collection already exists in the database.
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Returns `true` when the error reports a missing document rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::DocumentNotFound(..))
    }
}

/// A specialized `Result` type for document store operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`DocumentStoreError`].
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
