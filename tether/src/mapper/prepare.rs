use log::{debug, warn};

use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::schema::Schema;
use crate::store::{DocumentStore, PrepareOutcome};

/// How collection preparation treats administrative failures that are not
/// plain "already configured" responses.
///
/// The default keeps startup resilient: failures are logged and preparation
/// continues. `FailFast` propagates them instead, for deployments that prefer
/// a crash over silently running unsharded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PreparePolicy {
    #[default]
    WarnAndContinue,
    FailFast,
}

/// What preparation actually did for one collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrepareReport {
    indexes_created: usize,
    sharding_enabled: Option<PrepareOutcome>,
    collection_sharded: Option<PrepareOutcome>,
}

impl PrepareReport {
    pub fn indexes_created(&self) -> usize {
        self.indexes_created
    }

    pub fn sharding_enabled(&self) -> Option<PrepareOutcome> {
        self.sharding_enabled
    }

    pub fn collection_sharded(&self) -> Option<PrepareOutcome> {
        self.collection_sharded
    }
}

/// Runs the two idempotent setup steps for one collection: create every
/// declared index, then enable sharding and shard the collection when a
/// shard key is declared.
///
/// Index creation failures always propagate; a bad index declaration is a
/// startup configuration problem. Shard administration failures follow
/// `policy`; "already configured" responses are never failures, since
/// repeated preparation across process restarts is expected.
pub(crate) fn prepare_collection(
    store: &dyn DocumentStore,
    db_name: &str,
    schema: &Schema,
    policy: PreparePolicy,
) -> TetherResult<PrepareReport> {
    let collection = schema.collection_name().ok_or_else(|| {
        TetherError::new(
            &format!("embedded type {} cannot be prepared", schema.type_name()),
            ErrorKind::Argument,
        )
    })?;

    let mut report = PrepareReport::default();
    for index in schema.indexes() {
        store.create_index(collection, index)?;
        report.indexes_created += 1;
    }

    let Some(shard_key) = schema.shard_key() else {
        return Ok(report);
    };

    match store.enable_sharding(db_name) {
        Ok(outcome) => {
            if outcome == PrepareOutcome::AlreadyConfigured {
                debug!("sharding already enabled on database '{}'", db_name);
            }
            report.sharding_enabled = Some(outcome);
        }
        Err(e) => {
            if policy == PreparePolicy::FailFast {
                return Err(e);
            }
            warn!("enable shard failed: {}", e);
            return Ok(report);
        }
    }

    match store.shard_collection(collection, shard_key) {
        Ok(outcome) => {
            if outcome == PrepareOutcome::AlreadyConfigured {
                debug!("collection '{}' already sharded", collection);
            }
            report.collection_sharded = Some(outcome);
        }
        Err(e) => {
            if policy == PreparePolicy::FailFast {
                return Err(e);
            }
            warn!("shard collection failed: {}", e);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::schema::{Index, IndexOptions, ShardKey};
    use crate::store::memory::MemoryStore;

    fn sharded_schema() -> std::sync::Arc<Schema> {
        Schema::builder("Post")
            .field(Field::string("author").required())
            .index(Index::new(["author"], IndexOptions::new().unique()).unwrap())
            .shard_key(ShardKey::new(["author"]).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_prepare_creates_indexes_and_shards() {
        let store = MemoryStore::new();
        let schema = sharded_schema();
        let report =
            prepare_collection(&store, "db", &schema, PreparePolicy::WarnAndContinue).unwrap();
        assert_eq!(report.indexes_created(), 1);
        assert_eq!(report.sharding_enabled(), Some(PrepareOutcome::Applied));
        assert_eq!(report.collection_sharded(), Some(PrepareOutcome::Applied));
    }

    #[test]
    fn test_repeat_preparation_downgrades_to_already_configured() {
        let store = MemoryStore::new();
        let schema = sharded_schema();
        prepare_collection(&store, "db", &schema, PreparePolicy::WarnAndContinue).unwrap();
        let report =
            prepare_collection(&store, "db", &schema, PreparePolicy::WarnAndContinue).unwrap();
        assert_eq!(
            report.sharding_enabled(),
            Some(PrepareOutcome::AlreadyConfigured)
        );
        assert_eq!(
            report.collection_sharded(),
            Some(PrepareOutcome::AlreadyConfigured)
        );
    }

    #[test]
    fn test_unsharded_schema_skips_administration() {
        let store = MemoryStore::new();
        let schema = Schema::builder("Plain")
            .field(Field::int("n"))
            .build()
            .unwrap();
        let report =
            prepare_collection(&store, "db", &schema, PreparePolicy::WarnAndContinue).unwrap();
        assert_eq!(report.sharding_enabled(), None);
        assert_eq!(report.collection_sharded(), None);
    }
}
