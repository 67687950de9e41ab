//! The storage collaborator boundary.
//!
//! The mapper requires a small operation set from whatever holds the data,
//! parameterized by collection name. Everything network-ish (connection
//! management, pooling, driver command surface) lives behind this trait.
//! The crate ships [memory::MemoryStore], a complete in-memory
//! implementation used by the test suites.

pub mod memory;

use crate::common::{Doc, Value};
use crate::errors::TetherResult;
use crate::schema::{Index, ShardKey};

/// The two-part update directive handed to storage: `set` pairs are applied
/// unconditionally, `set_on_insert` pairs only when the operation performs an
/// insert.
#[derive(Clone, Debug, Default)]
pub struct UpdateSpec {
    set: Doc,
    set_on_insert: Doc,
}

impl UpdateSpec {
    pub fn new(set: Doc, set_on_insert: Doc) -> Self {
        UpdateSpec { set, set_on_insert }
    }

    pub fn set(&self) -> &Doc {
        &self.set
    }

    pub fn set_on_insert(&self) -> &Doc {
        &self.set_on_insert
    }

    /// An update whose unconditional part is empty changes nothing on a
    /// matched document; the engine skips the write entirely.
    pub fn is_noop(&self) -> bool {
        self.set.is_empty()
    }
}

/// One operation inside a bulk write batch.
#[derive(Clone, Debug)]
pub enum WriteOp {
    InsertOne {
        doc: Doc,
    },
    UpdateOne {
        filter: Doc,
        update: UpdateSpec,
        upsert: bool,
    },
}

/// Counters reported by a bulk write: documents inserted outright, update
/// operations that matched an existing document, and update operations that
/// inserted because nothing matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    inserted_count: u64,
    matched_count: u64,
    upserted_count: u64,
}

impl BulkWriteResult {
    pub fn new(inserted_count: u64, matched_count: u64, upserted_count: u64) -> Self {
        BulkWriteResult {
            inserted_count,
            matched_count,
            upserted_count,
        }
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted_count
    }

    pub fn matched_count(&self) -> u64 {
        self.matched_count
    }

    pub fn upserted_count(&self) -> u64 {
        self.upserted_count
    }
}

/// Outcome of one idempotent administrative setup call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The configuration was applied by this call.
    Applied,
    /// Storage reported the configuration already in place; repeated
    /// preparation across process restarts is expected.
    AlreadyConfigured,
}

/// A lazy stream of documents from a `find` call. Consumed once; not
/// restartable.
pub struct DocCursor {
    iter: Box<dyn Iterator<Item = Doc> + Send>,
}

impl DocCursor {
    pub fn new(iter: impl Iterator<Item = Doc> + Send + 'static) -> Self {
        DocCursor {
            iter: Box::new(iter),
        }
    }

    pub fn empty() -> Self {
        DocCursor::new(std::iter::empty())
    }
}

impl Iterator for DocCursor {
    type Item = Doc;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// The operation set the mapper requires from a storage collaborator.
///
/// Correctness of the upsert engine rests on `find_one_and_update` being
/// atomic: the engine deliberately never issues separate read-decide-write
/// sequences for the upsert path.
pub trait DocumentStore: Send + Sync {
    /// Inserts one document, assigning an identifier when the document
    /// carries none. Returns the identifier.
    fn insert_one(&self, collection: &str, doc: &Doc) -> TetherResult<Value>;

    /// Atomic find-and-modify. With `upsert`, a miss inserts a document
    /// composed of the filter's equality pairs, the `set` pairs, and the
    /// `set_on_insert` pairs. With `return_new`, the post-update document is
    /// returned.
    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Doc,
        update: &UpdateSpec,
        upsert: bool,
        return_new: bool,
    ) -> TetherResult<Option<Doc>>;

    fn find_one(&self, collection: &str, filter: &Doc) -> TetherResult<Option<Doc>>;

    fn find(&self, collection: &str, filter: &Doc) -> TetherResult<DocCursor>;

    /// Deletes at most one matching document; returns the deleted count.
    fn delete_one(&self, collection: &str, filter: &Doc) -> TetherResult<u64>;

    /// Creates an index; idempotent by storage contract.
    fn create_index(&self, collection: &str, index: &Index) -> TetherResult<()>;

    fn bulk_write(
        &self,
        collection: &str,
        ops: Vec<WriteOp>,
        ordered: bool,
    ) -> TetherResult<BulkWriteResult>;

    /// Atomic integer increment-and-fetch on the dedicated counters table,
    /// keyed by field name.
    fn increment_and_get(&self, counter: &str) -> TetherResult<i64>;

    /// Enables sharding on the owning database; idempotent.
    fn enable_sharding(&self, db_name: &str) -> TetherResult<PrepareOutcome>;

    /// Shards the collection by the given key; idempotent.
    fn shard_collection(&self, collection: &str, key: &ShardKey) -> TetherResult<PrepareOutcome>;
}
