//! The identifier value type used as the primary key of stored documents.
//!
//! [`ObjectId`] is a 12-byte key whose external form is a 24 character hex string.
//! The all-zero value is the "unset" identifier: it is never valid, serializes as
//! `null` (so it does not constrain query patterns) and is replaced by a freshly
//! generated value when a record is inserted.

use bson::{Bson, oid};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A globally unique, store-assignable document key.
///
/// # Example
///
/// ```ignore
/// use docmap::identifier::ObjectId;
///
/// let unset = ObjectId::default();
/// assert!(!unset.is_valid());
///
/// let id = ObjectId::generate();
/// assert!(id.is_valid());
/// assert_eq!(ObjectId::parse(&id.to_hex()).unwrap(), id);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        Self(oid::ObjectId::new().bytes())
    }

    /// Parses the 24 character hex form of an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] if `text` is not exactly
    /// 24 hexadecimal characters, or spells the unset (all-zero) identifier.
    pub fn parse(text: &str) -> DocumentStoreResult<Self> {
        oid::ObjectId::parse_str(text)
            .map(Self::from)
            .ok()
            .filter(Self::is_valid)
            .ok_or_else(|| DocumentStoreError::InvalidIdentifier(text.to_string()))
    }

    /// Builds an identifier from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of this identifier.
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Returns `true` unless this is the zero (unset) identifier.
    pub fn is_valid(&self) -> bool {
        self.0 != [0; 12]
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        oid::ObjectId::from_bytes(self.0).to_hex()
    }

    /// Returns the store representation, or `None` for the unset identifier.
    pub fn as_oid(&self) -> Option<oid::ObjectId> {
        self.is_valid()
            .then(|| oid::ObjectId::from_bytes(self.0))
    }
}

impl From<oid::ObjectId> for ObjectId {
    fn from(value: oid::ObjectId) -> Self {
        Self(value.bytes())
    }
}

impl From<ObjectId> for Bson {
    fn from(value: ObjectId) -> Self {
        match value.as_oid() {
            Some(oid) => Bson::ObjectId(oid),
            None => Bson::Null,
        }
    }
}

impl FromStr for ObjectId {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectId")
            .field(&self.to_hex())
            .finish()
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_oid().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(
            Option::<oid::ObjectId>::deserialize(deserializer)?
                .map(Self::from)
                .unwrap_or_default()
        )
    }
}
