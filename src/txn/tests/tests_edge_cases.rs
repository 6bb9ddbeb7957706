use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use crate::codec::CodecOptions;
use crate::crypto::Key;
use crate::index::{Index, IndexRegistry};
use crate::lock::LockManager;
use crate::model::IndexKind;
use crate::model::IsolationLevel;
use crate::store::Store;
use crate::txn::{BufferedOp, TransactionManager, TxnError};
use crate::wal::{Wal, WalConfig};

fn harness(dir: &std::path::Path) -> (Store, Wal, TransactionManager) {
    let key = Key::generate();
    let store = Store::new(dir.join("tables"), Some(Key::new(*key.as_bytes())), CodecOptions::default());
    let (wal, _, _) = Wal::open(dir.join("wal"), Some(&key), WalConfig::default()).unwrap();
    let locks = LockManager::new(Duration::from_millis(500));
    let txns = TransactionManager::new(locks, Duration::from_millis(500));
    (store, wal, txns)
}

#[test]
fn committing_against_a_missing_table_surfaces_store_not_found() {
    let dir = tempdir().unwrap();
    let (store, wal, txns) = harness(dir.path());
    let mut indexes = IndexRegistry::new();

    let id = txns.start(IsolationLevel::ReadCommitted);
    txns.buffer(
        id,
        BufferedOp::Add {
            table: "ghosts".into(),
            row: json!({"id": "1"}).as_object().unwrap().clone(),
        },
    )
    .unwrap();

    let err = txns.commit(id, &store, &wal, &mut indexes).unwrap_err();
    assert!(matches!(err, TxnError::Store(_)));
}

#[test]
fn unique_index_violation_aborts_the_whole_commit() {
    let dir = tempdir().unwrap();
    let (store, wal, txns) = harness(dir.path());
    let mut indexes = IndexRegistry::new();

    store.create("users", None).unwrap();
    let existing = json!({"id": "1", "email": "a@example.com"})
        .as_object()
        .unwrap()
        .clone();
    store.replace_rows("users", vec![existing.clone()]).unwrap();

    let index = Index::create(
        dir.path(),
        None,
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        true,
        IndexKind::Hash,
        &[existing],
    )
    .unwrap();
    indexes.insert(index);

    let id = txns.start(IsolationLevel::ReadCommitted);
    txns.buffer(
        id,
        BufferedOp::Add {
            table: "users".into(),
            row: json!({"id": "2", "email": "a@example.com"})
                .as_object()
                .unwrap()
                .clone(),
        },
    )
    .unwrap();

    let err = txns.commit(id, &store, &wal, &mut indexes).unwrap_err();
    assert!(matches!(err, TxnError::Index(_)));

    let file = store.load_existing("users").unwrap();
    assert_eq!(file.rows.len(), 1, "aborted commit must not add the row");
}

#[test]
fn updating_a_nonexistent_row_surfaces_row_not_found() {
    let dir = tempdir().unwrap();
    let (store, wal, txns) = harness(dir.path());
    let mut indexes = IndexRegistry::new();

    store.create("users", None).unwrap();

    let id = txns.start(IsolationLevel::ReadCommitted);
    txns.buffer(
        id,
        BufferedOp::Update {
            table: "users".into(),
            id: "missing".into(),
            new_row: json!({"id": "missing", "name": "nobody"})
                .as_object()
                .unwrap()
                .clone(),
        },
    )
    .unwrap();

    let err = txns.commit(id, &store, &wal, &mut indexes).unwrap_err();
    assert!(matches!(err, TxnError::RowNotFound(_, _)));
}

#[test]
fn committing_or_rolling_back_an_unknown_transaction_fails() {
    let dir = tempdir().unwrap();
    let (store, wal, txns) = harness(dir.path());
    let mut indexes = IndexRegistry::new();

    let bogus = 0xDEAD_BEEFu128;
    assert!(matches!(
        txns.commit(bogus, &store, &wal, &mut indexes),
        Err(TxnError::NotFound(_))
    ));
    assert!(matches!(txns.rollback(bogus), Err(TxnError::NotFound(_))));
}

#[test]
fn committed_index_mutation_is_persisted_to_disk() {
    let dir = tempdir().unwrap();
    let (store, wal, txns) = harness(dir.path());
    let mut indexes = IndexRegistry::new();

    store.create("users", None).unwrap();
    let index = Index::create(
        dir.path(),
        None,
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        true,
        IndexKind::Hash,
        &[],
    )
    .unwrap();
    indexes.insert(index);

    let id = txns.start(IsolationLevel::ReadCommitted);
    txns.buffer(
        id,
        BufferedOp::Add {
            table: "users".into(),
            row: json!({"id": "1", "email": "a@example.com"})
                .as_object()
                .unwrap()
                .clone(),
        },
    )
    .unwrap();
    txns.commit(id, &store, &wal, &mut indexes).unwrap();

    // Drop the in-memory registry and reload straight from disk: the
    // committed insert must already be reflected in the persisted file,
    // not just in the `IndexRegistry` that witnessed the commit.
    let reloaded = Index::load(dir.path(), None, CodecOptions::default(), "by_email")
        .unwrap()
        .expect("index file exists");
    assert_eq!(reloaded.lookup("a@example.com"), ["1".to_string()]);

    // And uniqueness is enforced against the reloaded copy too.
    let err = reloaded
        .check_unique(&json!({"id": "2", "email": "a@example.com"}).as_object().unwrap().clone())
        .unwrap_err();
    assert!(matches!(err, crate::index::IndexError::UniqueViolation(_, _)));
}

#[test]
fn schema_violation_aborts_before_any_write() {
    let dir = tempdir().unwrap();
    let (store, wal, txns) = harness(dir.path());
    let mut indexes = IndexRegistry::new();

    let schema = json!({
        "type": "object",
        "properties": {"age": {"type": "number"}},
        "required": ["age"]
    });
    store.create("people", Some(schema)).unwrap();

    let id = txns.start(IsolationLevel::ReadCommitted);
    txns.buffer(
        id,
        BufferedOp::Add {
            table: "people".into(),
            row: json!({"id": "1"}).as_object().unwrap().clone(),
        },
    )
    .unwrap();

    let err = txns.commit(id, &store, &wal, &mut indexes).unwrap_err();
    assert!(matches!(err, TxnError::Schema(_)));

    let file = store.load_existing("people").unwrap();
    assert!(file.rows.is_empty());
}
