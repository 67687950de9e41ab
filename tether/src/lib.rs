//! # Tether - Typed Object-Document Mapper
//!
//! Tether maps typed, schema-bound records onto a document database. An
//! application declares a [Schema](crate::schema::Schema) per document type
//! (fields, indexes, shard key, id formatter) and tether validates,
//! (de)serializes, and reconciles records against storage with
//! upsert/insert semantics that understand default values, partial updates,
//! and unique-key identity.
//!
//! ## Key Features
//!
//! - **Typed fields**: a closed set of field kinds (string, int, datetime,
//!   enum, list, map, embedded, counter, ...) each owning its storage
//!   conversions, validation, and pre-save hooks
//! - **Upsert reconciliation**: computed identity filters (id, synthesized
//!   id, or unique-indexed fields) and two-part update payloads
//!   (set / set-on-insert) applied in one atomic find-and-modify
//! - **Declarative lifecycle**: per-collection index and shard preparation,
//!   idempotent and explicit about outcomes
//! - **Pluggable storage**: everything behind the
//!   [DocumentStore](crate::store::DocumentStore) trait; an in-memory store
//!   ships with the crate
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether::database::Database;
//! use tether::doc;
//! use tether::field::Field;
//! use tether::registry::Registry;
//! use tether::schema::{Index, IndexOptions, Schema};
//! use tether::store::memory::MemoryStore;
//!
//! # fn main() -> tether::errors::TetherResult<()> {
//! let schema = Schema::builder("Post")
//!     .field(Field::string("title").required())
//!     .field(Field::int("views").with_default(0))
//!     .index(Index::new(["title"], IndexOptions::new().unique())?)
//!     .build()?;
//!
//! let registry = Registry::new();
//! registry.declare(&schema)?;
//!
//! let db = Database::open(Arc::new(MemoryStore::new()), "blog");
//! db.bind(&registry)?;
//!
//! let posts = db.collection(&schema)?;
//! let mut post = posts.record(doc! { title: "hello" })?;
//! posts.upsert(&mut post)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Storage values, raw docs, identifiers, utilities
//! - [`database`] - Database handles and schema binding
//! - [`errors`] - Error types and result definitions
//! - [`field`] - Typed field descriptors
//! - [`mapper`] - Collection handles: the save/upsert engine and lifecycle
//! - [`record`] - Schema-bound document instances
//! - [`registry`] - Declared schemas awaiting binding
//! - [`schema`] - Schema metadata and its builder
//! - [`store`] - The storage collaborator boundary and the in-memory store

use crate::common::SnowflakeIdGenerator;
use std::sync::LazyLock;

pub mod common;
pub mod database;
pub mod errors;
pub mod field;
pub mod mapper;
pub mod record;
pub mod registry;
pub mod schema;
pub mod store;

pub(crate) static ID_GENERATOR: LazyLock<SnowflakeIdGenerator> =
    LazyLock::new(SnowflakeIdGenerator::new);
