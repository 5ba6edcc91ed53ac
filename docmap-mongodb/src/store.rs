use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use tracing::{debug, info};

use docmap_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    config::ClientConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    record::ID_FIELD,
};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;
/// Server error code for creating a collection that already exists.
const NAMESPACE_EXISTS: i32 = 48;
/// Server error code for a missing collection.
const NAMESPACE_NOT_FOUND: i32 = 26;

fn error_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn backend_error(err: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}


#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        info!(database = %self.database, "closing MongoDB client");
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        let id = document
            .get(ID_FIELD)
            .map(ToString::to_string)
            .unwrap_or_default();

        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| match error_code(&e) {
                Some(DUPLICATE_KEY) => DocumentStoreError::DocumentAlreadyExists(id, collection.to_string()),
                _ => backend_error(e),
            })?;

        Ok(())
    }

    async fn find_document(&self, filter: Document, collection: &str) -> DocumentStoreResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .await
            .map_err(backend_error)
    }

    async fn find_documents(
        &self,
        filter: Document,
        sort: Option<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();
        options.sort = sort;

        self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn replace_document(
        &self,
        filter: Document,
        replacement: Document,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .replace_one(filter, replacement)
                .await
                .map_err(backend_error)?
                .matched_count
        )
    }

    async fn delete_document(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        Ok(
            self.get_collection(collection)
                .delete_one(filter)
                .await
                .map_err(backend_error)?
                .deleted_count
        )
    }

    async fn aggregate(&self, pipeline: Vec<Document>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(|e| match error_code(&e) {
                Some(NAMESPACE_EXISTS) => DocumentStoreError::CollectionAlreadyExists(name.to_string()),
                _ => backend_error(e),
            })
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        // the driver treats dropping a missing collection as success
        if !self.list_collections().await?.iter().any(|existing| existing == name) {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        self.get_collection(name)
            .drop()
            .await
            .map_err(|e| match error_code(&e) {
                Some(NAMESPACE_NOT_FOUND) => DocumentStoreError::CollectionNotFound(name.to_string()),
                _ => backend_error(e),
            })
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

/// Builder for [`MongoDbStore`].
///
/// Building parses the connection string, connects and pings the server, so an
/// unreachable store fails here rather than on first use.
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    /// Creates a builder from the connection settings of a [`ClientConfig`].
    pub fn from_config(config: &ClientConfig) -> DocumentStoreResult<Self> {
        config.validate()?;

        Ok(Self::new(&config.url, &config.database))
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
        )
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        debug!(database = %self.database, "connected to MongoDB");

        Ok(MongoDbStore::new(client, self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_connection_string_fails_to_build() {
        assert!(matches!(
            MongoDbStoreBuilder::new("not a connection string", "local").build().await,
            Err(DocumentStoreError::Initialization(_))
        ));
    }

    #[test]
    fn builder_from_config_rejects_empty_settings() {
        let config = ClientConfig::new("mongodb://localhost:27017", "", "testCollection");

        assert!(matches!(
            MongoDbStoreBuilder::from_config(&config),
            Err(DocumentStoreError::Configuration(_))
        ));
    }

    #[test]
    fn builder_from_config_takes_url_and_database() {
        let config = ClientConfig::new("mongodb://localhost:27017", "local", "testCollection");
        let builder = MongoDbStoreBuilder::from_config(&config).unwrap();

        assert_eq!(builder.dsn, "mongodb://localhost:27017");
        assert_eq!(builder.database, "local");
    }
}
