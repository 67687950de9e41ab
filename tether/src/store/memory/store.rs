use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::common::{Doc, DocId, Value, COUNTERS_COLLECTION, COUNTER_SEQ_FIELD};
use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::schema::{Index, ShardKey};
use crate::store::{BulkWriteResult, DocCursor, DocumentStore, PrepareOutcome, UpdateSpec, WriteOp};

/// In-memory implementation of [DocumentStore].
///
/// # Purpose
/// `MemoryStore` provides a complete storage collaborator suitable for tests
/// and temporary data. Each collection's state sits behind its own mutex, so
/// `find_one_and_update` is atomic exactly the way the upsert engine
/// requires; unique indexes registered through `create_index` are enforced on
/// every write path.
///
/// # Characteristics
/// - **Thread-Safe**: clones share state; per-collection locking
/// - **Unique enforcement**: inserts, updates, and upsert-inserts collide
///   with [ErrorKind::UniqueViolation]
/// - **Counters**: a dedicated atomic increment-and-fetch table
/// - **No Persistence**: all data is lost when the store is dropped
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Current value of a counter, if it was ever incremented. Test hook.
    pub fn counter_value(&self, counter: &str) -> Option<i64> {
        let state = self.inner.collection(COUNTERS_COLLECTION);
        let state = state.lock();
        let mut filter = Doc::new();
        filter.set_id(counter);
        state
            .find_match(&filter)
            .and_then(|id| state.docs.get(&id).cloned())
            .and_then(|doc| doc.get(COUNTER_SEQ_FIELD).and_then(|v| v.as_integer()))
    }

    /// Number of documents currently held by a collection. Test hook.
    pub fn collection_size(&self, collection: &str) -> usize {
        self.inner
            .collection(collection)
            .lock()
            .docs
            .len()
    }

    fn state(&self, collection: &str) -> Arc<Mutex<CollectionState>> {
        self.inner.collection(collection)
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    collections: DashMap<String, Arc<Mutex<CollectionState>>>,
    sharding_enabled: Mutex<HashSet<String>>,
    sharded_collections: Mutex<HashSet<String>>,
}

impl MemoryStoreInner {
    fn collection(&self, name: &str) -> Arc<Mutex<CollectionState>> {
        self.collections
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

/// What an update operation did, for bulk accounting.
enum UpdateEffect {
    Matched,
    Upserted,
    Missed,
}

#[derive(Default)]
struct CollectionState {
    docs: BTreeMap<Value, Doc>,
    indexes: Vec<Index>,
}

impl CollectionState {
    fn matches(doc: &Doc, filter: &Doc) -> bool {
        filter.iter().all(|(k, v)| doc.get(k) == Some(v))
    }

    fn find_match(&self, filter: &Doc) -> Option<Value> {
        self.docs
            .iter()
            .find(|(_, doc)| Self::matches(doc, filter))
            .map(|(id, _)| id.clone())
    }

    /// Rejects `candidate` when any registered unique index already holds the
    /// same key tuple on a different document. Documents lacking one of the
    /// indexed keys are skipped, so partially-populated documents do not
    /// collide on absence.
    fn check_unique(&self, candidate: &Doc, exclude_id: Option<&Value>) -> TetherResult<()> {
        for index in self.indexes.iter().filter(|i| i.is_unique()) {
            let tuple: Option<Vec<&Value>> = index
                .key_names()
                .map(|key| candidate.get(key).filter(|v| !v.is_null()))
                .collect();
            let Some(tuple) = tuple else {
                continue;
            };
            for (id, doc) in &self.docs {
                if exclude_id == Some(id) {
                    continue;
                }
                let other: Option<Vec<&Value>> = index
                    .key_names()
                    .map(|key| doc.get(key).filter(|v| !v.is_null()))
                    .collect();
                if other == Some(tuple.clone()) {
                    return Err(TetherError::new(
                        &format!(
                            "unique index on ({}) violated",
                            index.key_names().collect::<Vec<_>>().join(", ")
                        ),
                        ErrorKind::UniqueViolation,
                    ));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, doc: &Doc) -> TetherResult<Value> {
        let mut doc = doc.clone();
        let id = match doc.id() {
            Some(id) => id.clone(),
            None => {
                let id = Value::Id(DocId::new());
                doc.set_id(id.clone());
                id
            }
        };
        if self.docs.contains_key(&id) {
            return Err(TetherError::new(
                &format!("duplicate document id {:?}", id),
                ErrorKind::UniqueViolation,
            ));
        }
        self.check_unique(&doc, None)?;
        self.docs.insert(id.clone(), doc);
        Ok(id)
    }

    fn update_one(
        &mut self,
        filter: &Doc,
        update: &UpdateSpec,
        upsert: bool,
        return_new: bool,
    ) -> TetherResult<(Option<Doc>, UpdateEffect)> {
        if let Some(id) = self.find_match(filter) {
            let old = self.docs.get(&id).cloned().unwrap_or_default();
            let mut new = old.clone();
            new.merge(update.set());
            self.check_unique(&new, Some(&id))?;
            self.docs.insert(id, new.clone());
            let returned = if return_new { new } else { old };
            return Ok((Some(returned), UpdateEffect::Matched));
        }

        if !upsert {
            return Ok((None, UpdateEffect::Missed));
        }

        // Upsert miss: the inserted document is composed of the filter's
        // equality pairs, the unconditional pairs, and the insert-only pairs.
        let mut new = Doc::new();
        new.merge(filter);
        new.merge(update.set());
        new.merge(update.set_on_insert());
        let id = self.insert(&new)?;
        let stored = self.docs.get(&id).cloned();
        Ok((
            if return_new { stored } else { None },
            UpdateEffect::Upserted,
        ))
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(&self, collection: &str, doc: &Doc) -> TetherResult<Value> {
        self.state(collection).lock().insert(doc)
    }

    fn find_one_and_update(
        &self,
        collection: &str,
        filter: &Doc,
        update: &UpdateSpec,
        upsert: bool,
        return_new: bool,
    ) -> TetherResult<Option<Doc>> {
        let (doc, _) = self
            .state(collection)
            .lock()
            .update_one(filter, update, upsert, return_new)?;
        Ok(doc)
    }

    fn find_one(&self, collection: &str, filter: &Doc) -> TetherResult<Option<Doc>> {
        let state = self.state(collection);
        let state = state.lock();
        Ok(state.find_match(filter).and_then(|id| state.docs.get(&id).cloned()))
    }

    fn find(&self, collection: &str, filter: &Doc) -> TetherResult<DocCursor> {
        let state = self.state(collection);
        let state = state.lock();
        let matching: Vec<Doc> = state
            .docs
            .values()
            .filter(|doc| CollectionState::matches(doc, filter))
            .cloned()
            .collect();
        Ok(DocCursor::new(matching.into_iter()))
    }

    fn delete_one(&self, collection: &str, filter: &Doc) -> TetherResult<u64> {
        let state = self.state(collection);
        let mut state = state.lock();
        match state.find_match(filter) {
            Some(id) => {
                state.docs.remove(&id);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn create_index(&self, collection: &str, index: &Index) -> TetherResult<()> {
        let state = self.state(collection);
        let mut state = state.lock();
        let keys: Vec<&str> = index.key_names().collect();
        if state
            .indexes
            .iter()
            .any(|existing| existing.key_names().collect::<Vec<_>>() == keys)
        {
            return Ok(());
        }
        if index.is_unique() {
            // an index over existing duplicates cannot be built
            let docs: Vec<Doc> = state.docs.values().cloned().collect();
            let mut probe = CollectionState {
                docs: BTreeMap::new(),
                indexes: vec![index.clone()],
            };
            for doc in docs {
                probe.insert(&doc)?;
            }
        }
        state.indexes.push(index.clone());
        Ok(())
    }

    fn bulk_write(
        &self,
        collection: &str,
        ops: Vec<WriteOp>,
        _ordered: bool,
    ) -> TetherResult<BulkWriteResult> {
        let mut inserted = 0;
        let mut matched = 0;
        let mut upserted = 0;
        for op in ops {
            match op {
                WriteOp::InsertOne { doc } => {
                    self.insert_one(collection, &doc)?;
                    inserted += 1;
                }
                WriteOp::UpdateOne {
                    filter,
                    update,
                    upsert,
                } => {
                    let (_, effect) = self
                        .state(collection)
                        .lock()
                        .update_one(&filter, &update, upsert, false)?;
                    match effect {
                        UpdateEffect::Matched => matched += 1,
                        UpdateEffect::Upserted => upserted += 1,
                        UpdateEffect::Missed => {}
                    }
                }
            }
        }
        Ok(BulkWriteResult::new(inserted, matched, upserted))
    }

    /// Counters live as ordinary documents in the dedicated counters
    /// collection (`{_id: <name>, seq: <n>}`), incremented under the
    /// collection lock.
    fn increment_and_get(&self, counter: &str) -> TetherResult<i64> {
        let state = self.state(COUNTERS_COLLECTION);
        let mut state = state.lock();
        let mut filter = Doc::new();
        filter.set_id(counter);
        match state.find_match(&filter) {
            Some(id) => {
                let mut doc = state.docs.get(&id).cloned().unwrap_or_default();
                let next = doc
                    .get(COUNTER_SEQ_FIELD)
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0)
                    + 1;
                doc.insert(COUNTER_SEQ_FIELD, next);
                state.docs.insert(id, doc);
                Ok(next)
            }
            None => {
                let mut doc = Doc::new();
                doc.set_id(counter);
                doc.insert(COUNTER_SEQ_FIELD, 1i64);
                state.insert(&doc)?;
                Ok(1)
            }
        }
    }

    fn enable_sharding(&self, db_name: &str) -> TetherResult<PrepareOutcome> {
        if self.inner.sharding_enabled.lock().insert(db_name.to_string()) {
            Ok(PrepareOutcome::Applied)
        } else {
            Ok(PrepareOutcome::AlreadyConfigured)
        }
    }

    fn shard_collection(&self, collection: &str, _key: &ShardKey) -> TetherResult<PrepareOutcome> {
        if self
            .inner
            .sharded_collections
            .lock()
            .insert(collection.to_string())
        {
            Ok(PrepareOutcome::Applied)
        } else {
            Ok(PrepareOutcome::AlreadyConfigured)
        }
    }
}
