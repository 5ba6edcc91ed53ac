//! Record traits and the field introspector.
//!
//! A record is any caller-defined struct stored as one document. The [`Record`] trait
//! exposes the two role fields the client cares about:
//!
//! - the **identifier**, stored as `_id`, which every record must carry exactly once
//! - the optional **slug**, a human readable secondary key
//!
//! Implementations are normally generated with `#[derive(Record)]`, which checks the
//! role markers at compile time. Embedded records marked `inline` delegate both roles
//! to the embedded member, so a composite record resolves the same field its member does.
//!
//! [`IdentifierDescriptor`] is a short-lived, two-way binding into a record instance: it
//! reads the current identifier and writes a new one back into the record it was resolved
//! from. [`SlugDescriptor`] resolves the slug role of a record type for lookups.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Record)]
//! pub struct Article {
//!     #[record(id)]
//!     #[serde(rename = "_id")]
//!     pub id: ObjectId,
//!     #[record(slug)]
//!     pub name: String,
//!     pub body: String,
//! }
//!
//! let mut article = Article { id: ObjectId::default(), name: "hello".into(), body: String::new() };
//! let mut descriptor = IdentifierDescriptor::resolve(&mut article);
//! assert!(!descriptor.is_valid());
//! descriptor.assign_if_invalid();
//! assert!(article.id.is_valid());
//! ```

use bson::{Bson, Document, doc};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    identifier::ObjectId,
};

/// Store-facing name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Core trait that every record stored through a [`DocumentClient`](crate::client::DocumentClient)
/// must implement.
///
/// # Deriving
///
/// `#[derive(Record)]` generates this trait from `#[record(id)]`, `#[record(slug)]` and
/// `#[record(inline)]` field markers.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Store-facing name of the slug field, if the record has one.
    const SLUG_FIELD: Option<&'static str> = None;

    /// Returns a reference to this record's identifier.
    fn identifier(&self) -> &ObjectId;

    /// Returns a mutable reference to this record's identifier.
    fn identifier_mut(&mut self) -> &mut ObjectId;
}

/// Extension trait providing document conversions for records.
///
/// This trait is automatically implemented for all types that implement [`Record`].
pub trait RecordExt: Record {
    /// Converts this record to a BSON document for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the record does not serialize to a document.
    fn to_document(&self) -> DocumentStoreResult<Document>;

    /// Creates a record from a stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_document(document: Document) -> DocumentStoreResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_document(&self) -> DocumentStoreResult<Document> {
        Ok(bson::serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> DocumentStoreResult<Self> {
        Ok(bson::deserialize_from_document(document)?)
    }
}

/// A live binding to the identifier field of one record instance.
#[derive(Debug)]
pub struct IdentifierDescriptor<'a> {
    field: &'a mut ObjectId,
}

impl<'a> IdentifierDescriptor<'a> {
    /// Resolves the identifier field of `record`.
    pub fn resolve<R: Record>(record: &'a mut R) -> Self {
        Self { field: record.identifier_mut() }
    }

    /// Returns `true` if the record currently holds a valid identifier.
    pub fn is_valid(&self) -> bool {
        self.field.is_valid()
    }

    /// Writes `value` back into the record.
    pub fn set(&mut self, value: ObjectId) {
        *self.field = value;
    }

    /// Generates and writes back a fresh identifier unless the record already holds a
    /// valid one. Returns the identifier the record holds afterwards.
    pub fn assign_if_invalid(&mut self) -> ObjectId {
        if !self.is_valid() {
            self.set(ObjectId::generate());
        }

        *self.field
    }
}

/// The slug role of a record type.
///
/// Slugs are only ever looked up, never written by the client, so the descriptor is
/// resolved per type and turns caller text into a lookup filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlugDescriptor {
    field_name: &'static str,
}

impl SlugDescriptor {
    /// Resolves the slug role of `R`.
    ///
    /// Returns `None` when the record type has no slug; callers treat that as
    /// "no slug available".
    pub fn resolve<R: Record>() -> Option<Self> {
        R::SLUG_FIELD.map(|field_name| Self { field_name })
    }

    /// Resolves the slug role of `R` for a slug lookup.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if `R` has no slug role.
    pub fn require<R: Record>() -> DocumentStoreResult<Self> {
        Self::resolve::<R>().ok_or_else(|| {
            DocumentStoreError::Configuration(format!(
                "record type {} has no slug field; mark one with #[record(slug)]",
                std::any::type_name::<R>(),
            ))
        })
    }

    /// Returns the store-facing name of the slug field.
    pub fn field_name(&self) -> &'static str {
        self.field_name
    }

    /// Returns the filter document selecting records whose slug is `slug`.
    pub fn filter(&self, slug: &str) -> Document {
        doc! { self.field_name: slug }
    }
}

/// Returns the filter document selecting `id`.
pub fn id_filter(id: &ObjectId) -> Document {
    doc! { ID_FIELD: Bson::from(*id) }
}
