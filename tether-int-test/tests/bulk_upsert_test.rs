use std::sync::Arc;

use tether::doc;
use tether::errors::ErrorKind;
use tether::field::Field;
use tether::record::Record;
use tether::schema::{Index, IndexOptions, Schema};
use tether_int_test::test_util::{cleanup, create_test_context, run_test};

fn q_schema() -> Arc<Schema> {
    Schema::builder("Q")
        .field(Field::int("u"))
        .field(Field::string("t"))
        .index(Index::new(["u"], IndexOptions::new().unique()).unwrap())
        .build()
        .unwrap()
}

#[test]
fn test_bulk_upsert_reports_only_collisions() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&q_schema())?;

            // two documents already exist
            for (u, t) in [(1, "old1"), (2, "old2")] {
                let mut q = coll.record(doc! { u: u, t: t })?;
                coll.upsert(&mut q)?;
            }

            // five incoming records: u=1 and u=2 collide, the rest are fresh
            let mut batch: Vec<Record> = (1..=5)
                .map(|u| {
                    let t = format!("new{}", u);
                    coll.record(doc! { u: u, t: t })
                })
                .collect::<Result<_, _>>()?;

            let updated = coll.bulk_upsert(&mut batch)?;
            assert_eq!(updated, 2);
            assert_eq!(ctx.store().collection_size("q"), 5);

            let q1 = coll.query_one(doc! { u: 1 })?.unwrap();
            assert_eq!(q1.get("t")?, "new1".into());
            let q5 = coll.query_one(doc! { u: 5 })?.unwrap();
            assert_eq!(q5.get("t")?, "new5".into());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_bulk_upsert_rejects_foreign_records_before_any_write() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&q_schema())?;

            let other = Schema::builder("Other")
                .field(Field::int("n"))
                .build()
                .unwrap();

            let mut batch = vec![
                coll.record(doc! { u: 1, t: "a" })?,
                Record::new(&other, doc! { n: 1 })?,
            ];
            let err = coll.bulk_upsert(&mut batch).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Argument);
            // the well-formed record was not written either
            assert_eq!(ctx.store().collection_size("q"), 0);

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_bulk_upsert_omits_empty_diffs() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&q_schema())?;

            // t is absent (null) and nulls are skipped: nothing to set, so
            // the record is left out of the batch entirely
            let mut batch = vec![coll.record(doc! { u: 9 })?];
            let updated = coll.bulk_upsert(&mut batch)?;
            assert_eq!(updated, 0);
            assert_eq!(ctx.store().collection_size("q"), 0);

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_bulk_upsert_validation_aborts_batch() {
    run_test(
        create_test_context,
        |ctx| {
            let schema = Schema::builder("V")
                .field(Field::string("name").required())
                .field(Field::int("u"))
                .index(Index::new(["u"], IndexOptions::new().unique()).unwrap())
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut batch = vec![
                coll.record(doc! { name: "ok", u: 1 })?,
                coll.record(doc! { u: 2 })?,
            ];
            let err = coll.bulk_upsert(&mut batch).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Validation);
            assert_eq!(ctx.store().collection_size("v"), 0);

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_bulk_upsert_mixes_inserts_and_updates() {
    run_test(
        create_test_context,
        |ctx| {
            // without a unique index there is no identity: all inserts
            let schema = Schema::builder("Plain")
                .field(Field::string("t"))
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut batch = vec![
                coll.record(doc! { t: "a" })?,
                coll.record(doc! { t: "b" })?,
            ];
            let updated = coll.bulk_upsert(&mut batch)?;
            assert_eq!(updated, 0);
            assert_eq!(ctx.store().collection_size("plain"), 2);

            Ok(())
        },
        cleanup,
    )
}
