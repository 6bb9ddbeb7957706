use serde_json::json;

use crate::engine::{EventKind, QuerySpec};
use crate::model::{IndexKind, IsolationLevel};
use crate::query::{CmpOp, Condition, Filter};

use super::open_test_engine;

#[test]
fn create_table_add_and_query_round_trip() {
    let (_dir, engine) = open_test_engine();

    engine.create_table("users", None).unwrap();
    let row = json!({"name": "ada", "city": "london"}).as_object().unwrap().clone();
    let inserted = engine.add_data("users", row, None).unwrap();
    assert!(inserted.contains_key("id"));

    let rows = engine.query("users", &QuerySpec::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name").unwrap(), "ada");
}

#[test]
fn explicit_transaction_commit_persists_buffered_ops() {
    let (_dir, engine) = open_test_engine();
    engine.create_table("orders", None).unwrap();

    let txn = engine.start_transaction(IsolationLevel::ReadCommitted).unwrap();
    engine
        .add_data("orders", json!({"id": "1", "total": 10}).as_object().unwrap().clone(), Some(txn))
        .unwrap();
    engine
        .add_data("orders", json!({"id": "2", "total": 20}).as_object().unwrap().clone(), Some(txn))
        .unwrap();

    let before = engine.query("orders", &QuerySpec::default()).unwrap();
    assert!(before.is_empty(), "buffered ops must not be visible before commit");

    engine.commit_transaction(txn).unwrap();
    let after = engine.query("orders", &QuerySpec::default()).unwrap();
    assert_eq!(after.len(), 2);
}

#[test]
fn rollback_discards_buffered_transaction() {
    let (_dir, engine) = open_test_engine();
    engine.create_table("orders", None).unwrap();

    let txn = engine.start_transaction(IsolationLevel::ReadCommitted).unwrap();
    engine
        .add_data("orders", json!({"id": "1"}).as_object().unwrap().clone(), Some(txn))
        .unwrap();
    engine.rollback_transaction(txn).unwrap();

    assert!(engine.commit_transaction(txn).is_err(), "rolled-back id is gone");
    let rows = engine.query("orders", &QuerySpec::default()).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn index_assisted_equality_query_returns_matching_rows() {
    let (_dir, engine) = open_test_engine();
    engine.create_table("users", None).unwrap();
    engine
        .add_data("users", json!({"id": "1", "city": "warsaw"}).as_object().unwrap().clone(), None)
        .unwrap();
    engine
        .add_data("users", json!({"id": "2", "city": "london"}).as_object().unwrap().clone(), None)
        .unwrap();
    engine
        .create_index("users", "by_city", vec!["city".into()], false, IndexKind::Hash)
        .unwrap();

    let spec = QuerySpec {
        filter: Some(Filter::Condition(Condition {
            column: "city".into(),
            operator: CmpOp::Eq,
            value: json!("warsaw"),
        })),
        ..QuerySpec::default()
    };
    let rows = engine.query("users", &spec).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id").unwrap(), "1");
}

#[test]
fn listeners_receive_commit_events() {
    let (_dir, engine) = open_test_engine();
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    engine.on(EventKind::Add, move |_event| {
        seen_clone.lock().unwrap().push(());
    });

    engine.create_table("users", None).unwrap();
    engine
        .add_data("users", json!({"id": "1"}).as_object().unwrap().clone(), None)
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn close_is_idempotent() {
    let (_dir, engine) = open_test_engine();
    engine.close().unwrap();
    engine.close().unwrap();
}
