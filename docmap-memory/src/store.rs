//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that stores documents as BSON
//! documents in insertion order, guarded by async-safe read-write locks.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid};
use tracing::debug;

use docmap_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    backend::{StoreBackend, StoreBackendBuilder},
    record::ID_FIELD,
};

use crate::{
    aggregate::run_pipeline,
    evaluator::{DocumentEvaluator, sort_documents, values_equal},
};

type CollectionDocs = Vec<Document>;
type StoreMap = HashMap<String, CollectionDocs>;


/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait with MongoDB semantics for the
/// supported subset of filters and aggregation stages, operating entirely in memory.
/// Documents keep insertion order, so "the first matching document" is the earliest
/// inserted one.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use the MongoDB backend.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_document(doc! { "_id": 1, "name": "Alice", "age": 30 }, "users").await?;
///
///     let found = store.find_document(doc! { "age": { "$gte": 18 } }, "users").await?;
///     assert!(found.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    ///
    /// The returned store is ready for use and contains no collections or documents.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docmap_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    fn position(documents: &[Document], filter: &Document) -> DocumentStoreResult<Option<usize>> {
        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(filter)? {
                return Ok(Some(index));
            }
        }

        Ok(None)
    }
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_document(&self, document: Document, collection: &str) -> DocumentStoreResult<()> {
        let document = match document.get(ID_FIELD) {
            Some(Bson::Null) | None => {
                let mut with_id = Document::new();
                with_id.insert(ID_FIELD, oid::ObjectId::new());
                with_id.extend(document.into_iter().filter(|(key, _)| key != ID_FIELD));
                with_id
            }
            Some(_) => document,
        };

        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        if let Some(id) = document.get(ID_FIELD) {
            if documents
                .iter()
                .any(|existing| existing.get(ID_FIELD).is_some_and(|other| values_equal(other, id)))
            {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
            }
        }

        debug!(collection, "inserted document");
        documents.push(document);

        Ok(())
    }

    async fn find_document(&self, filter: Document, collection: &str) -> DocumentStoreResult<Option<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(docs) => docs,
            None => return Ok(None),
        };

        Ok(
            Self::position(documents, &filter)?
                .map(|index| documents[index].clone())
        )
    }

    async fn find_documents(
        &self,
        filter: Document,
        sort: Option<Document>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(collection) {
            Some(docs) => docs,
            None => return Ok(vec![]),
        };

        let mut matched = DocumentEvaluator::filter_documents(documents, &filter)?;

        if let Some(sort) = &sort {
            sort_documents(&mut matched, sort)?;
        }

        Ok(matched)
    }

    async fn replace_document(
        &self,
        filter: Document,
        replacement: Document,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(docs) => docs,
            None => return Ok(0),
        };

        let Some(index) = Self::position(documents, &filter)? else {
            return Ok(0);
        };

        let existing_id = documents[index]
            .get(ID_FIELD)
            .cloned()
            .unwrap_or(Bson::Null);

        if let Some(new_id) = replacement.get(ID_FIELD) {
            if !values_equal(new_id, &existing_id) {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "the _id field is immutable: cannot replace {existing_id} with {new_id}"
                )));
            }
        }

        let mut updated = Document::new();
        updated.insert(ID_FIELD, existing_id);
        updated.extend(replacement.into_iter().filter(|(key, _)| key != ID_FIELD));
        documents[index] = updated;

        debug!(collection, "replaced document");

        Ok(1)
    }

    async fn delete_document(&self, filter: Document, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(collection) {
            Some(docs) => docs,
            None => return Ok(0),
        };

        match Self::position(documents, &filter)? {
            Some(index) => {
                documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn aggregate(&self, pipeline: Vec<Document>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let snapshot = self.store
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();

        run_pipeline(snapshot, &pipeline)
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();

        Ok(names)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.contains_key(name) {
            return Err(DocumentStoreError::CollectionAlreadyExists(name.to_string()));
        }

        store.insert(name.to_string(), CollectionDocs::new());

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// A builder can be seeded with an existing store so several clients share its data.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryStore;
/// use docmap::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    store: Option<InMemoryStore>,
}

impl InMemoryStoreBuilder {
    /// Builds on `store` instead of a fresh one; the built backend shares its data.
    pub fn with_store(mut self, store: InMemoryStore) -> Self {
        self.store = Some(store);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns an [`InMemoryStore`] instance.
    ///
    /// This always succeeds.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(self.store.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();

        for (id, name, value) in [(1, "world", "Hello"), (2, "moon", "Hello"), (3, "world", "Bye")] {
            store
                .insert_document(doc! { "_id": id, "name": name, "value": value }, "greetings")
                .await
                .unwrap();
        }

        store
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = seeded().await;

        assert!(matches!(
            store.insert_document(doc! { "_id": 1i64, "name": "again" }, "greetings").await,
            Err(DocumentStoreError::DocumentAlreadyExists(_, collection)) if collection == "greetings"
        ));
    }

    #[tokio::test]
    async fn insert_generates_missing_id_first() {
        let store = InMemoryStore::new();

        store.insert_document(doc! { "name": "world" }, "greetings").await.unwrap();

        let found = store.find_document(doc! {}, "greetings").await.unwrap().unwrap();
        assert_eq!(found.keys().next().map(String::as_str), Some("_id"));
        assert!(found.get_object_id("_id").is_ok());
    }

    #[tokio::test]
    async fn find_document_returns_first_match() {
        let store = seeded().await;

        let found = store.find_document(doc! { "name": "world" }, "greetings").await.unwrap();

        assert_eq!(found.unwrap().get_i32("_id").unwrap(), 1);
        assert!(store.find_document(doc! { "name": "sun" }, "greetings").await.unwrap().is_none());
        assert!(store.find_document(doc! {}, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_documents_sorts_when_asked() {
        let store = seeded().await;

        let found = store
            .find_documents(doc! { "value": "Hello" }, Some(doc! { "name": 1 }), "greetings")
            .await
            .unwrap();

        let names = found
            .iter()
            .map(|d| d.get_str("name").unwrap())
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["moon", "world"]);
    }

    #[tokio::test]
    async fn replace_keeps_id_and_never_inserts() {
        let store = seeded().await;

        let matched = store
            .replace_document(doc! { "_id": 2 }, doc! { "name": "moon", "value": "Bye" }, "greetings")
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let replaced = store.find_document(doc! { "_id": 2 }, "greetings").await.unwrap().unwrap();
        assert_eq!(replaced, doc! { "_id": 2, "name": "moon", "value": "Bye" });

        let missing = store
            .replace_document(doc! { "_id": 9 }, doc! { "name": "sun" }, "greetings")
            .await
            .unwrap();
        assert_eq!(missing, 0);
        assert!(store.find_document(doc! { "name": "sun" }, "greetings").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_rejects_id_change() {
        let store = seeded().await;

        assert!(matches!(
            store.replace_document(doc! { "_id": 1 }, doc! { "_id": 5, "name": "x" }, "greetings").await,
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_first_match_only() {
        let store = seeded().await;

        assert_eq!(store.delete_document(doc! { "name": "world" }, "greetings").await.unwrap(), 1);
        assert_eq!(store.delete_document(doc! { "value": { "$in": ["Hello", "Bye"] } }, "greetings").await.unwrap(), 1);
        assert_eq!(
            store.find_documents(doc! {}, None, "greetings").await.unwrap(),
            vec![doc! { "_id": 3, "name": "world", "value": "Bye" }]
        );
    }

    #[tokio::test]
    async fn collection_management() {
        let store = InMemoryStore::new();

        store.create_collection("b").await.unwrap();
        store.create_collection("a").await.unwrap();

        assert!(matches!(
            store.create_collection("a").await,
            Err(DocumentStoreError::CollectionAlreadyExists(_))
        ));
        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);

        store.drop_collection("a").await.unwrap();

        assert!(matches!(
            store.drop_collection("a").await,
            Err(DocumentStoreError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn aggregate_over_collection() {
        let store = seeded().await;

        let grouped = store
            .aggregate(vec![
                doc! { "$match": {} },
                doc! { "$group": { "_id": "$value", "count": { "$sum": 1 } } },
                doc! { "$sort": { "_id": -1 } },
            ], "greetings")
            .await
            .unwrap();

        assert_eq!(grouped, vec![
            doc! { "_id": "Hello", "count": 2 },
            doc! { "_id": "Bye", "count": 1 },
        ]);
    }

    #[tokio::test]
    async fn builder_shares_seeded_store() {
        let store = seeded().await;
        let built = InMemoryStore::builder().with_store(store.clone()).build().await.unwrap();

        assert_eq!(built.find_documents(doc! {}, None, "greetings").await.unwrap().len(), 3);
    }
}
