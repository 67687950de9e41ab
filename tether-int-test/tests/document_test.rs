use std::sync::Arc;

use tether::doc;
use tether::errors::ErrorKind;
use tether::field::Field;
use tether::schema::{Index, IndexOptions, Schema};
use tether_int_test::test_util::{cleanup, create_test_context, run_test};

fn test_schema() -> Arc<Schema> {
    Schema::builder("Test")
        .field(Field::string("text").required())
        .field(Field::int("status"))
        .field(Field::int("count").with_default(0))
        .index(Index::new(["text", "status"], IndexOptions::new().unique()).unwrap())
        .build()
        .unwrap()
}

#[test]
fn test_crud() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&test_schema())?;

            let mut t = coll.record(doc! { text: "aaa", status: 2 })?;
            coll.save(&mut t)?;

            assert_eq!(t.get("count")?, 0.into());
            assert!(t.id().is_some());

            let mut t2 = coll.record(doc! { text: "aaa", status: 2, count: 5 })?;
            coll.upsert(&mut t2)?;
            assert_eq!(t2.get("count")?, 5.into());
            assert_eq!(t2.id(), t.id());

            coll.remove(&mut t2)?;
            coll.refresh(&mut t2)?;
            assert!(t2.id().is_none());
            assert!(t2.data().is_empty());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_required_field_without_value_fails_validation() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&test_schema())?;

            let mut t = coll.record(doc! { status: 1 })?;
            let err = coll.save(&mut t).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Validation);
            let err = coll.upsert(&mut t).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Validation);

            // nothing reached storage
            assert!(coll.query_one(doc! {})?.is_none());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_default_persists_when_not_supplied() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&test_schema())?;

            let mut t = coll.record(doc! { text: "bbb", status: 3 })?;
            coll.save(&mut t)?;

            let fetched = coll.query_one(doc! { text: "bbb" })?.unwrap();
            assert_eq!(fetched.get("count")?, 0.into());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_query_wraps_records() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&test_schema())?;

            for i in 0..3 {
                let text = format!("t{}", i);
                let mut t = coll.record(doc! { text: text, status: i })?;
                coll.save(&mut t)?;
            }

            let all: Vec<_> = coll.query(doc! {})?.collect::<Result<_, _>>()?;
            assert_eq!(all.len(), 3);

            let one = coll.query_one(doc! { text: "t1" })?.unwrap();
            assert_eq!(one.get("status")?, 1.into());
            assert!(coll.query_one(doc! { text: "nope" })?.is_none());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_refresh_reloads_stored_state() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&test_schema())?;

            let mut t = coll.record(doc! { text: "aaa", status: 2 })?;
            coll.save(&mut t)?;

            // drift the in-memory copy, then reload
            t.set("count", 99)?;
            coll.refresh(&mut t)?;
            assert_eq!(t.get("count")?, 0.into());
            // a reloaded record has no notion of default-filled fields
            assert!(t.defaults().is_empty());

            Ok(())
        },
        cleanup,
    )
}
