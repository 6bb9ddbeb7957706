use serde_json::json;
use tempfile::tempdir;

use crate::codec::CodecOptions;
use crate::crypto::Key;
use crate::store::{Store, StoreError};

#[test]
fn loading_a_missing_table_returns_none() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), Some(Key::generate()), CodecOptions::default());
    assert!(store.load("ghost").unwrap().is_none());
}

#[test]
fn load_existing_on_a_missing_table_errors() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), Some(Key::generate()), CodecOptions::default());
    let err = store.load_existing("ghost").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn deleting_a_missing_table_is_a_no_op() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), Some(Key::generate()), CodecOptions::default());
    assert!(store.delete("ghost").is_ok());
}

#[test]
fn wrong_key_cannot_decrypt_a_persisted_table() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), Some(Key::generate()), CodecOptions::default());
    store.create("users", None).unwrap();

    let other = Store::new(dir.path(), Some(Key::generate()), CodecOptions::default());
    let err = other.load_existing("users").unwrap_err();
    assert!(matches!(err, StoreError::Codec(_)));
}

#[test]
fn replace_rows_on_a_missing_table_errors() {
    let dir = tempdir().unwrap();
    let store = Store::new(dir.path(), Some(Key::generate()), CodecOptions::default());
    let row = json!({"id": "1"}).as_object().unwrap().clone();
    let err = store.replace_rows("ghost", vec![row]).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
