use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::mapper::{prepare_collection, Collection, PreparePolicy, PrepareReport};
use crate::registry::Registry;
use crate::schema::Schema;
use crate::store::DocumentStore;

/// A named database on a storage collaborator, plus the set of schemas bound
/// to it.
///
/// Binding connects declared schemas to live storage and runs each
/// collection's preparation (index creation, shard setup) exactly once.
/// Binding the same registry (or the same schema) again is a no-op for the
/// already-prepared part, and is safe to do concurrently from multiple
/// callers: preparation is serialized and tracked per collection.
///
/// Operations through [Collection] handles require the schema to be bound
/// first; asking for a handle earlier is a [ErrorKind::Config] error.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    name: String,
    store: Arc<dyn DocumentStore>,
    policy: PreparePolicy,
    bound: DashMap<String, Arc<Schema>>,
    prepared: Mutex<HashSet<String>>,
}

impl Database {
    /// Opens a database handle with the default preparation policy
    /// (warn-and-continue).
    pub fn open(store: Arc<dyn DocumentStore>, name: &str) -> Self {
        Database::open_with_policy(store, name, PreparePolicy::default())
    }

    pub fn open_with_policy(
        store: Arc<dyn DocumentStore>,
        name: &str,
        policy: PreparePolicy,
    ) -> Self {
        Database {
            inner: Arc::new(DatabaseInner {
                name: name.to_string(),
                store,
                policy,
                bound: DashMap::new(),
                prepared: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// Binds every schema declared in `registry`; idempotent.
    pub fn bind(&self, registry: &Registry) -> TetherResult<()> {
        for schema in registry.schemas() {
            self.bind_schema(&schema)?;
        }
        Ok(())
    }

    /// Binds one schema, running its collection preparation the first time.
    ///
    /// Re-binding after a successful preparation does nothing. A failed
    /// preparation leaves the schema unbound so a later attempt retries it.
    pub fn bind_schema(&self, schema: &Arc<Schema>) -> TetherResult<Option<PrepareReport>> {
        let name = schema.collection_name().ok_or_else(|| {
            TetherError::new(
                &format!("embedded type {} cannot be bound", schema.type_name()),
                ErrorKind::Argument,
            )
        })?;

        // Serialize preparation; concurrent binders of the same collection
        // wait here and find it already prepared.
        let mut prepared = self.inner.prepared.lock();
        if prepared.contains(name) {
            return Ok(None);
        }
        let report =
            prepare_collection(self.inner.store.as_ref(), &self.inner.name, schema, self.inner.policy)?;
        prepared.insert(name.to_string());
        self.inner.bound.insert(name.to_string(), Arc::clone(schema));
        debug!(
            "bound {} to {}.{} ({} indexes)",
            schema.type_name(),
            self.inner.name,
            name,
            report.indexes_created()
        );
        Ok(Some(report))
    }

    /// Returns a collection handle for a bound schema.
    pub fn collection(&self, schema: &Arc<Schema>) -> TetherResult<Collection> {
        let name = schema.collection_name().ok_or_else(|| {
            TetherError::new(
                &format!("embedded type {} has no collection", schema.type_name()),
                ErrorKind::Argument,
            )
        })?;
        let bound = self
            .inner
            .bound
            .get(name)
            .map(|entry| Arc::ptr_eq(entry.value(), schema))
            .unwrap_or(false);
        if !bound {
            return Err(TetherError::new(
                &format!(
                    "{} is not bound to database '{}', did you bind the registry?",
                    schema.type_name(),
                    self.inner.name
                ),
                ErrorKind::Config,
            ));
        }
        Collection::new(Arc::clone(schema), Arc::clone(&self.inner.store))
    }
}
