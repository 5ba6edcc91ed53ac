//! The generic CRUD and query façade over one bound collection.
//!
//! A [`DocumentClient`] moves through three states:
//!
//! ```text
//! Unbound --connect--> Connected --close--> Closed
//! ```
//!
//! Every operation other than [`connect`](DocumentClient::connect) requires the `Connected`
//! state and fails with [`DocumentStoreError::InvalidState`] otherwise. A client binds exactly
//! one collection for its lifetime; binding another collection takes a new client.
//!
//! The client's own work is identifier lifecycle management (assigning identifiers on insert,
//! validating identifier text before any store call, routing slug lookups) and shaping filters,
//! sort specs and pipelines. All I/O is delegated to the [`StoreBackend`].
//!
//! # Example
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
//! let mut client = DocumentClient::new();
//! client.connect(InMemoryStore::builder(), "testCollection").await?;
//!
//! let mut record = HelloWorld { id: ObjectId::default(), name: "world".into(), value: "Hello".into() };
//! let id = client.insert(&mut record).await?;
//!
//! let found: HelloWorld = client.read_by_slug("world").await?;
//! assert_eq!(found.id, id);
//!
//! client.close().await?;
//! ```

use bson::{Bson, Document, doc};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::ObjectId,
    pipeline::Pipeline,
    query::{Sort, pattern_filter, sort_document},
    record::{ID_FIELD, IdentifierDescriptor, Record, RecordExt, SlugDescriptor, id_filter},
};

/// Lifecycle state of a [`DocumentClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// No connection has been established yet.
    Unbound,
    /// Bound to a collection and ready for operations.
    Connected,
    /// The connection has been released.
    Closed,
}

/// A backend connection bound to one collection.
#[derive(Debug)]
struct CollectionHandle<B> {
    backend: B,
    name: String,
}

#[derive(Debug)]
enum ClientState<B> {
    Unbound,
    Connected(CollectionHandle<B>),
    Closed,
}

/// Generic CRUD and query operations over one collection of a document store.
///
/// # Type Parameters
///
/// * `B` - The storage backend type
///
/// # Resource Release
///
/// Call [`close`](DocumentClient::close) when done. Dropping a connected client still
/// releases the backend, but logs a warning since the release was not explicit.
#[derive(Debug)]
pub struct DocumentClient<B: StoreBackend> {
    state: ClientState<B>,
}

impl<B: StoreBackend> Default for DocumentClient<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: StoreBackend> DocumentClient<B> {
    /// Creates an unbound client.
    pub fn new() -> Self {
        Self { state: ClientState::Unbound }
    }

    /// Creates a client already bound to `collection` on an existing backend.
    pub fn bind(backend: B, collection: impl Into<String>) -> Self {
        Self {
            state: ClientState::Connected(CollectionHandle { backend, name: collection.into() }),
        }
    }

    /// Creates a client and connects it in one step.
    ///
    /// # Errors
    ///
    /// See [`connect`](DocumentClient::connect).
    pub async fn connected<Bld>(builder: Bld, collection: &str) -> DocumentStoreResult<Self>
    where
        Bld: StoreBackendBuilder<Backend = B>,
    {
        let mut client = Self::new();
        client.connect(builder, collection).await?;

        Ok(client)
    }

    /// Establishes the store connection and binds `collection`.
    ///
    /// # Arguments
    ///
    /// * `builder` - Backend builder carrying the connection string and database
    /// * `collection` - The collection this client operates on
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidState`] unless the client is unbound, and the
    /// builder's [`Initialization`](DocumentStoreError::Initialization) error if the store is
    /// unreachable or the connection string is malformed. A failed connect leaves the client
    /// unbound.
    pub async fn connect<Bld>(&mut self, builder: Bld, collection: &str) -> DocumentStoreResult<()>
    where
        Bld: StoreBackendBuilder<Backend = B>,
    {
        if self.status() != ClientStatus::Unbound {
            return Err(DocumentStoreError::InvalidState(format!(
                "cannot connect a {:?} client; create a new client to bind another collection",
                self.status(),
            )));
        }

        let backend = builder.build().await?;
        info!(collection, "document client connected");

        self.state = ClientState::Connected(CollectionHandle {
            backend,
            name: collection.to_string(),
        });

        Ok(())
    }

    /// Releases the store connection.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidState`] if the client is not connected, or the
    /// backend's shutdown error. The client is closed either way once a connected client
    /// has been asked to close.
    pub async fn close(&mut self) -> DocumentStoreResult<()> {
        match std::mem::replace(&mut self.state, ClientState::Closed) {
            ClientState::Connected(handle) => {
                info!(collection = %handle.name, "document client closing");
                handle.backend.shutdown().await
            }
            previous => {
                self.state = previous;
                Err(self.state_error())
            }
        }
    }

    /// Returns the lifecycle state of this client.
    pub fn status(&self) -> ClientStatus {
        match self.state {
            ClientState::Unbound => ClientStatus::Unbound,
            ClientState::Connected(_) => ClientStatus::Connected,
            ClientState::Closed => ClientStatus::Closed,
        }
    }

    /// Returns the bound collection name while connected.
    pub fn collection_name(&self) -> Option<&str> {
        match &self.state {
            ClientState::Connected(handle) => Some(&handle.name),
            _ => None,
        }
    }

    fn state_error(&self) -> DocumentStoreError {
        DocumentStoreError::InvalidState(format!(
            "operation requires a connected client, client is {:?}",
            self.status(),
        ))
    }

    fn handle(&self) -> DocumentStoreResult<&CollectionHandle<B>> {
        match &self.state {
            ClientState::Connected(handle) => Ok(handle),
            _ => Err(self.state_error()),
        }
    }

    /// Inserts a record, assigning it an identifier if it has none.
    ///
    /// The generated identifier is written back into `record` before the document is sent,
    /// so the caller's instance reflects the assigned key on return.
    ///
    /// # Returns
    ///
    /// The identifier the record was stored under.
    ///
    /// # Errors
    ///
    /// Returns the backend's error on duplicate keys or transport failures.
    pub async fn insert<D: Record>(&self, record: &mut D) -> DocumentStoreResult<ObjectId> {
        let handle = self.handle()?;
        let id = IdentifierDescriptor::resolve(record).assign_if_invalid();

        debug!(collection = %handle.name, %id, "inserting document");

        handle.backend
            .insert_document(record.to_document()?, &handle.name)
            .await?;

        Ok(id)
    }

    /// Replaces the stored document carrying `record`'s identifier.
    ///
    /// This never inserts: a record whose identifier matches no stored document is reported
    /// as not found and the store is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::MissingIdentifier`] if the record has no valid identifier
    /// and [`DocumentStoreError::DocumentNotFound`] if no document carries it.
    pub async fn update<D: Record>(&self, record: &D) -> DocumentStoreResult<()> {
        let handle = self.handle()?;
        let id = *record.identifier();

        if !id.is_valid() {
            return Err(DocumentStoreError::MissingIdentifier(handle.name.clone()));
        }

        debug!(collection = %handle.name, %id, "replacing document");

        let matched = handle.backend
            .replace_document(id_filter(&id), record.to_document()?, &handle.name)
            .await?;

        if matched == 0 {
            return Err(DocumentStoreError::DocumentNotFound(id.to_hex(), handle.name.clone()));
        }

        Ok(())
    }

    /// Replaces a single document matching `filter` with `replacement`.
    ///
    /// If several documents match, exactly one is replaced; which one is store-dependent
    /// and not guaranteed to be stable. An unset identifier in `replacement` is dropped so
    /// the replaced document keeps its own.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if nothing matches.
    pub async fn update_filtered<R>(&self, filter: Document, replacement: &R) -> DocumentStoreResult<()>
    where
        R: Serialize + ?Sized,
    {
        let handle = self.handle()?;
        let mut replacement = bson::serialize_to_document(replacement)?;

        if matches!(replacement.get(ID_FIELD), Some(Bson::Null)) {
            replacement.remove(ID_FIELD);
        }

        debug!(collection = %handle.name, %filter, "replacing filtered document");

        let matched = handle.backend
            .replace_document(filter.clone(), replacement, &handle.name)
            .await?;

        if matched == 0 {
            return Err(DocumentStoreError::DocumentNotFound(filter.to_string(), handle.name.clone()));
        }

        Ok(())
    }

    async fn read_one<D: Record>(&self, handle: &CollectionHandle<B>, filter: Document) -> DocumentStoreResult<D> {
        debug!(collection = %handle.name, %filter, "reading document");

        match handle.backend.find_document(filter.clone(), &handle.name).await? {
            Some(document) => D::from_document(document),
            None => Err(DocumentStoreError::DocumentNotFound(filter.to_string(), handle.name.clone())),
        }
    }

    /// Reads the single document matching a query-by-example pattern.
    ///
    /// See [`pattern_filter`] for how patterns become filters.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if nothing matches.
    pub async fn read_by_value<D, P>(&self, pattern: &P) -> DocumentStoreResult<D>
    where
        D: Record,
        P: Serialize + ?Sized,
    {
        let handle = self.handle()?;
        self.read_one(handle, pattern_filter(pattern)?).await
    }

    /// Reads the single document matching a raw filter.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DocumentNotFound`] if nothing matches.
    pub async fn read_by_filter<D: Record>(&self, filter: Document) -> DocumentStoreResult<D> {
        let handle = self.handle()?;
        self.read_one(handle, filter).await
    }

    /// Reads the document with the identifier given in its hex form.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] without contacting the store if
    /// `id` does not parse, and [`DocumentStoreError::DocumentNotFound`] if no document
    /// carries it.
    pub async fn read_by_id<D: Record>(&self, id: &str) -> DocumentStoreResult<D> {
        let handle = self.handle()?;
        let id = ObjectId::parse(id)?;

        self.read_one(handle, id_filter(&id)).await
    }

    /// Reads a document by identifier or, failing that, by slug.
    ///
    /// Text that parses as an identifier is always looked up as an identifier, even when no
    /// such document exists; the result is then not found, never a slug lookup. Any other text
    /// is matched against the slug field of `D`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if `text` is not an identifier and `D`
    /// has no slug field, and [`DocumentStoreError::DocumentNotFound`] if nothing matches.
    pub async fn read_by_slug<D: Record>(&self, text: &str) -> DocumentStoreResult<D> {
        let handle = self.handle()?;
        self.read_one(handle, Self::slug_route::<D>(text)?).await
    }

    fn slug_route<D: Record>(text: &str) -> DocumentStoreResult<Document> {
        match ObjectId::parse(text) {
            Ok(id) => Ok(id_filter(&id)),
            Err(_) => Ok(SlugDescriptor::require::<D>()?.filter(text)),
        }
    }

    async fn find_many<T: DeserializeOwned>(
        &self,
        handle: &CollectionHandle<B>,
        filter: Document,
        sort: Option<Document>,
    ) -> DocumentStoreResult<Vec<T>> {
        debug!(collection = %handle.name, %filter, "finding documents");

        handle.backend
            .find_documents(filter, sort, &handle.name)
            .await?
            .into_iter()
            .map(|document| Ok(bson::deserialize_from_document(document)?))
            .collect()
    }

    /// Returns every document in the collection.
    pub async fn find_all<D: Record>(&self) -> DocumentStoreResult<Vec<D>> {
        let handle = self.handle()?;
        self.find_many(handle, Document::new(), None).await
    }

    /// Returns every document matching a query-by-example pattern.
    pub async fn find_by_value<D, P>(&self, pattern: &P) -> DocumentStoreResult<Vec<D>>
    where
        D: Record,
        P: Serialize + ?Sized,
    {
        let handle = self.handle()?;
        self.find_many(handle, pattern_filter(pattern)?, None).await
    }

    /// Returns every document matching a pattern, sorted by `sort` in the order given.
    ///
    /// Each sort field is ascending unless prefixed with `-`:
    ///
    /// ```ignore
    /// let records: Vec<HelloWorld> = client
    ///     .find_by_value_sorted(&doc! { "value": "Hello" }, ["name", "-created"])
    ///     .await?;
    /// ```
    pub async fn find_by_value_sorted<D, P, S>(
        &self,
        pattern: &P,
        sort: impl IntoIterator<Item = S>,
    ) -> DocumentStoreResult<Vec<D>>
    where
        D: Record,
        P: Serialize + ?Sized,
        S: Into<Sort>,
    {
        let handle = self.handle()?;
        let sort = sort
            .into_iter()
            .map(Into::into)
            .collect::<Vec<Sort>>();

        self.find_many(handle, pattern_filter(pattern)?, sort_document(&sort)).await
    }

    /// Returns every document matching a raw filter.
    pub async fn find_by_filter<D: Record>(&self, filter: Document) -> DocumentStoreResult<Vec<D>> {
        let handle = self.handle()?;
        self.find_many(handle, filter, None).await
    }

    /// Returns the documents carrying the identifier given in its hex form.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] without contacting the store if
    /// `id` does not parse.
    pub async fn find_by_id<D: Record>(&self, id: &str) -> DocumentStoreResult<Vec<D>> {
        let handle = self.handle()?;
        let id = ObjectId::parse(id)?;

        self.find_many(handle, id_filter(&id), None).await
    }

    async fn run_pipeline<T: DeserializeOwned>(
        &self,
        handle: &CollectionHandle<B>,
        pipeline: Pipeline,
    ) -> DocumentStoreResult<Vec<T>> {
        debug!(collection = %handle.name, stages = pipeline.len(), "running aggregation");

        handle.backend
            .aggregate(pipeline.into_documents(), &handle.name)
            .await?
            .into_iter()
            .map(|document| Ok(bson::deserialize_from_document(document)?))
            .collect()
    }

    /// Runs a match → group → sort aggregation.
    ///
    /// # Arguments
    ///
    /// * `pattern` - Query-by-example pattern for the `$match` stage
    /// * `group` - The `$group` specification
    /// * `sort` - The `$sort` specification; the stage is omitted when empty
    ///
    /// # Returns
    ///
    /// The grouped documents decoded as `T`, which is usually a dedicated result type
    /// rather than the record type.
    pub async fn find_grouped<T, P>(
        &self,
        pattern: &P,
        group: Document,
        sort: Document,
    ) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let handle = self.handle()?;
        let pipeline = Pipeline::grouped(pattern_filter(pattern)?, group, sort);

        self.run_pipeline(handle, pipeline).await
    }

    /// Runs a match → redact → sort aggregation.
    ///
    /// Documents for which the aggregation expression `condition` is true are kept,
    /// the rest are pruned.
    ///
    /// # Arguments
    ///
    /// * `pattern` - Query-by-example pattern for the `$match` stage
    /// * `condition` - Aggregation expression deciding keep or prune
    /// * `sort` - The `$sort` specification; the stage is omitted when empty
    pub async fn find_redacted<T, P>(
        &self,
        pattern: &P,
        condition: Document,
        sort: Document,
    ) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let handle = self.handle()?;
        let pipeline = Pipeline::redacted(pattern_filter(pattern)?, condition, sort);

        self.run_pipeline(handle, pipeline).await
    }

    /// Deletes the document with the identifier given in its hex form.
    ///
    /// # Returns
    ///
    /// The number of deleted documents (`0` or `1`).
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] without contacting the store if
    /// `id` does not parse.
    pub async fn delete_by_id(&self, id: &str) -> DocumentStoreResult<u64> {
        let handle = self.handle()?;
        let id = ObjectId::parse(id)?;

        debug!(collection = %handle.name, %id, "deleting document");

        handle.backend
            .delete_document(id_filter(&id), &handle.name)
            .await
    }

    /// Deletes a document by identifier or, failing that, by slug.
    ///
    /// Routing follows [`read_by_slug`](DocumentClient::read_by_slug). A single document is
    /// deleted in both cases; if several documents share the slug, which one is removed is
    /// store-dependent.
    ///
    /// # Returns
    ///
    /// The number of deleted documents (`0` or `1`).
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if `text` is not an identifier and `D`
    /// has no slug field.
    pub async fn delete_by_slug<D: Record>(&self, text: &str) -> DocumentStoreResult<u64> {
        let handle = self.handle()?;
        let filter = Self::slug_route::<D>(text)?;

        debug!(collection = %handle.name, %filter, "deleting document");

        handle.backend
            .delete_document(filter, &handle.name)
            .await
    }

    /// Creates the bound collection unless it already exists.
    ///
    /// # Returns
    ///
    /// `true` if the collection was created, `false` if it was already present.
    pub async fn create_collection_if_absent(&self) -> DocumentStoreResult<bool> {
        let handle = self.handle()?;

        if handle.backend
            .list_collections()
            .await?
            .iter()
            .any(|name| name == &handle.name)
        {
            debug!(collection = %handle.name, "collection already present");
            return Ok(false);
        }

        match handle.backend.create_collection(&handle.name).await {
            Ok(()) => {
                info!(collection = %handle.name, "collection created");
                Ok(true)
            }
            // created concurrently between listing and creating
            Err(DocumentStoreError::CollectionAlreadyExists(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Drops the bound collection.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the collection does not exist.
    pub async fn drop_collection(&self) -> DocumentStoreResult<()> {
        let handle = self.handle()?;

        info!(collection = %handle.name, "dropping collection");

        handle.backend
            .drop_collection(&handle.name)
            .await
    }
}

impl<B: StoreBackend> Drop for DocumentClient<B> {
    fn drop(&mut self) {
        if let ClientState::Connected(handle) = &self.state {
            warn!(collection = %handle.name, "document client dropped while connected; releasing connection");
        }
    }
}
