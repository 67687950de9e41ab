use std::sync::Arc;

use tether::doc;
use tether::common::Value;
use tether::errors::ErrorKind;
use tether::field::Field;
use tether::schema::{Index, IndexOptions, Schema, ShardKey};
use tether::store::PrepareOutcome;
use tether_int_test::test_util::{cleanup, create_test_context, run_test};

// =============================================================================
// COUNTER FIELDS
// =============================================================================

fn job_schema() -> Arc<Schema> {
    Schema::builder("Job")
        .field(Field::string("name").required())
        .field(Field::counter("seq"))
        .build()
        .unwrap()
}

#[test]
fn test_counter_assigns_increasing_sequence() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&job_schema())?;

            let mut first = coll.record(doc! { name: "a" })?;
            coll.save(&mut first)?;
            assert_eq!(first.get("seq")?, Value::I64(1));

            let mut second = coll.record(doc! { name: "b" })?;
            coll.save(&mut second)?;
            assert_eq!(second.get("seq")?, Value::I64(2));

            assert_eq!(ctx.store().counter_value("seq"), Some(2));

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_counter_keeps_existing_value() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&job_schema())?;

            let mut preset = coll.record(doc! { name: "a", seq: 42 })?;
            coll.save(&mut preset)?;
            assert_eq!(preset.get("seq")?, Value::I32(42));
            // the counter table was never touched
            assert_eq!(ctx.store().counter_value("seq"), None);

            Ok(())
        },
        cleanup,
    )
}

// =============================================================================
// TIMESTAMP FIELDS
// =============================================================================

#[test]
fn test_modified_at_restamps_every_save() {
    run_test(
        create_test_context,
        |ctx| {
            let schema = Schema::builder("Doc")
                .field(Field::string("text").required())
                .field(Field::modified_at("updated"))
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut d = coll.record(doc! { text: "v1" })?;
            coll.save(&mut d)?;
            let first = d.get("updated")?;
            assert!(first.is_datetime());

            std::thread::sleep(std::time::Duration::from_millis(5));
            d.set("text", "v2")?;
            coll.save(&mut d)?;
            let second = d.get("updated")?;
            assert!(second.as_datetime().unwrap() >= first.as_datetime().unwrap());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_created_at_applies_once() {
    run_test(
        create_test_context,
        |ctx| {
            let schema = Schema::builder("Doc")
                .field(Field::string("text").required())
                .field(Field::created_at("created"))
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut d = coll.record(doc! { text: "v1" })?;
            coll.save(&mut d)?;
            let stamped = d.get("created")?;
            assert!(stamped.is_datetime());

            std::thread::sleep(std::time::Duration::from_millis(5));
            d.set("text", "v2")?;
            coll.save(&mut d)?;
            assert_eq!(d.get("created")?, stamped);

            let fetched = coll.query_one(doc! { text: "v2" })?.unwrap();
            assert_eq!(fetched.get("created")?, stamped);

            Ok(())
        },
        cleanup,
    )
}

// =============================================================================
// BINDING AND PREPARATION
// =============================================================================

#[test]
fn test_collection_before_bind_is_config_error() {
    run_test(
        create_test_context,
        |ctx| {
            let schema = job_schema();
            let err = ctx.db().collection(&schema).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Config);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_rebinding_is_idempotent() {
    run_test(
        create_test_context,
        |ctx| {
            let schema = Schema::builder("Post")
                .field(Field::string("author").required())
                .index(Index::new(["author"], IndexOptions::new().unique()).unwrap())
                .shard_key(ShardKey::new(["author"]).unwrap())
                .build()
                .unwrap();

            let registry = ctx.registry();
            registry.declare(&schema)?;
            registry.declare(&schema)?;

            let db = ctx.db();
            let report = db.bind_schema(&schema)?.unwrap();
            assert_eq!(report.indexes_created(), 1);
            assert_eq!(report.sharding_enabled(), Some(PrepareOutcome::Applied));
            assert_eq!(report.collection_sharded(), Some(PrepareOutcome::Applied));

            // re-binding never re-runs preparation
            assert!(db.bind_schema(&schema)?.is_none());
            db.bind(&registry)?;

            assert!(db.collection(&schema).is_ok());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_prepared_unique_index_is_live() {
    run_test(
        create_test_context,
        |ctx| {
            let schema = Schema::builder("Post")
                .field(Field::string("author").required())
                .index(Index::new(["author"], IndexOptions::new().unique()).unwrap())
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut a = coll.record(doc! { author: "x" })?;
            coll.save(&mut a)?;
            let mut b = coll.record(doc! { author: "x" })?;
            assert_eq!(
                coll.save(&mut b).unwrap_err().kind(),
                &ErrorKind::UniqueViolation
            );

            Ok(())
        },
        cleanup,
    )
}
