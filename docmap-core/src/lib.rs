//! A small object-document mapping layer over MongoDB-style document stores.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Records** ([`record`]) - The [`Record`](record::Record) trait and the identifier and slug descriptors
//! - **Identifiers** ([`identifier`]) - The [`ObjectId`](identifier::ObjectId) key type
//! - **Document client** ([`client`]) - CRUD, lookup and aggregation operations over one collection
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage backends
//! - **Query and filtering API** ([`query`]) - Patterns, filter expressions and sort specs
//! - **Aggregation pipelines** ([`pipeline`]) - Grouped and redacted pipeline shapes
//! - **Configuration** ([`config`]) - Connection settings
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{record::Record, identifier::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: ObjectId,
//!     pub name: String,
//! }
//!
//! impl Record for User {
//!     const SLUG_FIELD: Option<&'static str> = Some("name");
//!
//!     fn identifier(&self) -> &ObjectId {
//!         &self.id
//!     }
//!
//!     fn identifier_mut(&mut self) -> &mut ObjectId {
//!         &mut self.id
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod identifier;
pub mod pipeline;
pub mod query;
pub mod record;
