use std::sync::Arc;

use tether::doc;
use tether::common::Value;
use tether::errors::ErrorKind;
use tether::field::Field;
use tether::schema::Schema;
use tether_int_test::test_util::{cleanup, create_test_context, run_test};

fn e_schema() -> Arc<Schema> {
    Schema::embedded_builder("E")
        .field(Field::string("a"))
        .field(Field::string("b"))
        .build()
        .unwrap()
}

fn q_schema() -> Arc<Schema> {
    Schema::builder("Q")
        .field(Field::list(
            "es",
            Some(Field::embedded("e", e_schema())),
        ))
        .build()
        .unwrap()
}

#[test]
fn test_embedded() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&q_schema())?;

            let mut q = coll.record(doc! { es: [{ a: "a", b: "b" }] })?;
            coll.save(&mut q)?;

            let fetched = coll.query_one(doc! {})?.unwrap();
            let es = fetched.get("es")?;
            let items = es.as_array().unwrap();
            assert_eq!(items.len(), 1);
            let first = items[0].as_document().unwrap();
            assert_eq!(first.get("a"), Some(&Value::from("a")));
            assert_eq!(first.get("b"), Some(&Value::from("b")));

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_embedded_field_coerces_partial_input() {
    run_test(
        create_test_context,
        |ctx| {
            let profile = Schema::embedded_builder("Profile")
                .field(Field::string("city"))
                .field(Field::int("age").with_default(0))
                .build()
                .unwrap();
            let schema = Schema::builder("User")
                .field(Field::string("name").required())
                .field(Field::embedded("profile", profile))
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut u = coll.record(doc! { name: "ann", profile: { city: "Oslo" } })?;
            coll.save(&mut u)?;

            let fetched = coll.query_one(doc! { name: "ann" })?.unwrap();
            let profile = fetched.get("profile")?;
            let profile = profile.as_document().unwrap();
            // the embedded schema's default filled in
            assert_eq!(profile.get("age"), Some(&Value::I32(0)));
            assert_eq!(profile.get("city"), Some(&Value::from("Oslo")));

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_embedded_validation_recurses() {
    run_test(
        create_test_context,
        |ctx| {
            let inner = Schema::embedded_builder("Inner")
                .field(Field::string("must").required())
                .build()
                .unwrap();
            let schema = Schema::builder("Outer")
                .field(Field::embedded("inner", inner).required())
                .build()
                .unwrap();
            let coll = ctx.bind_collection(&schema)?;

            let mut bad = coll.record(doc! { inner: {} })?;
            let err = coll.save(&mut bad).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Validation);

            let mut good = coll.record(doc! { inner: { must: "here" } })?;
            assert!(coll.save(&mut good).is_ok());

            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_to_app_doc_expands_embedded_containers() {
    run_test(
        create_test_context,
        |ctx| {
            let coll = ctx.bind_collection(&q_schema())?;

            let mut q = coll.record(doc! { es: [{ a: "x", b: "y" }] })?;
            coll.save(&mut q)?;

            let expanded = q.to_app_doc()?;
            let es = expanded.get("es").unwrap().as_array().unwrap();
            let first = es[0].as_document().unwrap();
            assert_eq!(first.get("a"), Some(&Value::from("x")));

            Ok(())
        },
        cleanup,
    )
}
