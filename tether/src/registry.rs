use indexmap::IndexMap;
use std::sync::Arc;

use crate::common::{atomic, Atomic};
use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::schema::Schema;

/// An explicit registry of document schemas awaiting database binding.
///
/// Document types are frequently declared before any database connection
/// exists; declaring them into a `Registry` parks them until a
/// [crate::database::Database] binds the whole set. This is deliberately an
/// ordinary object passed by reference to whatever constructs connections.
/// There is no process-wide implicit table, and a registry can be created and
/// torn down freely (one per test, for instance).
///
/// Declaring is idempotent for the same schema; two *different* schemas
/// claiming one collection name collide at declaration time.
#[derive(Clone, Default)]
pub struct Registry {
    schemas: Atomic<IndexMap<String, Arc<Schema>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            schemas: atomic(IndexMap::new()),
        }
    }

    /// Parks a schema for later binding. Embedded schemas have no collection
    /// and cannot be declared.
    pub fn declare(&self, schema: &Arc<Schema>) -> TetherResult<()> {
        let name = schema.collection_name().ok_or_else(|| {
            TetherError::new(
                &format!(
                    "embedded type {} cannot be declared for persistence",
                    schema.type_name()
                ),
                ErrorKind::Argument,
            )
        })?;
        let mut schemas = self.schemas.write();
        if let Some(existing) = schemas.get(name) {
            if Arc::ptr_eq(existing, schema) {
                return Ok(());
            }
            return Err(TetherError::new(
                &format!(
                    "collection '{}' is already declared by type {}",
                    name,
                    existing.type_name()
                ),
                ErrorKind::Argument,
            ));
        }
        schemas.insert(name.to_string(), Arc::clone(schema));
        Ok(())
    }

    /// Every declared schema, in declaration order.
    pub fn schemas(&self) -> Vec<Arc<Schema>> {
        self.schemas.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}
