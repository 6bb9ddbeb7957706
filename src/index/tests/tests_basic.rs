use serde_json::json;
use tempfile::tempdir;

use crate::codec::CodecOptions;
use crate::crypto::Key;
use crate::index::Index;
use crate::model::{index_key, IndexKind};

fn row(id: &str, email: &str) -> serde_json::Map<String, serde_json::Value> {
    json!({"id": id, "email": email}).as_object().unwrap().clone()
}

#[test]
fn create_and_lookup() {
    let dir = tempdir().unwrap();
    let rows = vec![row("1", "a@x.com"), row("2", "b@x.com")];
    let index = Index::create(
        dir.path(),
        Some(Key::generate()),
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        true,
        IndexKind::Hash,
        &rows,
    )
    .unwrap();

    let key = index_key(&rows[0], &["email".into()]);
    assert_eq!(index.lookup(&key), &["1".to_string()]);
}

#[test]
fn persists_and_reloads_with_the_same_key() {
    let dir = tempdir().unwrap();
    let key_material = Key::generate();
    let rows = vec![row("1", "a@x.com")];
    Index::create(
        dir.path(),
        Some(Key::new(*key_material.as_bytes())),
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        false,
        IndexKind::Btree,
        &rows,
    )
    .unwrap();

    let reloaded = Index::load(
        dir.path(),
        Some(key_material),
        CodecOptions::default(),
        "by_email",
    )
    .unwrap()
    .expect("index file exists");

    let k = index_key(&rows[0], &["email".into()]);
    assert_eq!(reloaded.lookup(&k), &["1".to_string()]);
}

#[test]
fn insert_and_remove_update_buckets() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(
        dir.path(),
        Some(Key::generate()),
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        false,
        IndexKind::Hash,
        &[],
    )
    .unwrap();

    let r = row("1", "a@x.com");
    index.insert(&r);
    let k = index_key(&r, &["email".into()]);
    assert_eq!(index.lookup(&k), &["1".to_string()]);

    index.remove(&r);
    assert!(index.lookup(&k).is_empty());
}
