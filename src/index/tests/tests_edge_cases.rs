use serde_json::json;
use tempfile::tempdir;

use crate::codec::CodecOptions;
use crate::crypto::Key;
use crate::index::{Index, IndexRegistry};
use crate::model::IndexKind;

fn row(id: &str, email: &str) -> serde_json::Map<String, serde_json::Value> {
    json!({"id": id, "email": email}).as_object().unwrap().clone()
}

#[test]
fn creating_a_unique_index_over_duplicate_data_fails() {
    let dir = tempdir().unwrap();
    let rows = vec![row("1", "dup@x.com"), row("2", "dup@x.com")];
    let result = Index::create(
        dir.path(),
        Some(Key::generate()),
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        true,
        IndexKind::Hash,
        &rows,
    );
    assert!(result.is_err());
}

#[test]
fn unique_insert_conflict_is_rejected_before_mutation() {
    let dir = tempdir().unwrap();
    let mut index = Index::create(
        dir.path(),
        Some(Key::generate()),
        CodecOptions::default(),
        "users",
        "by_email",
        vec!["email".into()],
        true,
        IndexKind::Hash,
        &[row("1", "a@x.com")],
    )
    .unwrap();

    let conflicting = row("2", "a@x.com");
    assert!(index.check_unique(&conflicting).is_err());
    // Caller is expected not to call insert() after a failed check; the
    // bucket for "a@x.com" still holds only the original id.
    let existing = row("1", "a@x.com");
    let k = crate::model::index_key(&existing, &["email".into()]);
    assert_eq!(index.lookup(&k), &["1".to_string()]);
}

#[test]
fn reindex_moves_id_between_buckets_on_column_change() {
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
        &[row("1", "old@x.com")],
    )
    .unwrap();

    let old_row = row("1", "old@x.com");
    let new_row = row("1", "new@x.com");
    index.reindex(&old_row, &new_row).unwrap();

    let old_key = crate::model::index_key(&old_row, &["email".into()]);
    let new_key = crate::model::index_key(&new_row, &["email".into()]);
    assert!(index.lookup(&old_key).is_empty());
    assert_eq!(index.lookup(&new_key), &["1".to_string()]);
}

#[test]
fn for_table_preserves_insertion_order_for_tie_break() {
    let dir = tempdir().unwrap();
    let mut registry = IndexRegistry::new();

    for name in ["by_city", "by_email", "by_age"] {
        let index = Index::create(
            dir.path(),
            Some(Key::generate()),
            CodecOptions::default(),
            "users",
            name,
            vec![name.trim_start_matches("by_").to_string()],
            false,
            IndexKind::Hash,
            &[],
        )
        .unwrap();
        registry.insert(index);
    }

    let names: Vec<&str> = registry.for_table("users").iter().map(|i| i.name()).collect();
    assert_eq!(names, ["by_city", "by_email", "by_age"]);

    let mut_names: Vec<&str> = registry
        .for_table_mut("users")
        .iter()
        .map(|i| i.name())
        .collect();
    assert_eq!(mut_names, ["by_city", "by_email", "by_age"]);
}

#[test]
fn loading_a_missing_index_returns_none() {
    let dir = tempdir().unwrap();
    let result = Index::load(
        dir.path(),
        Some(Key::generate()),
        CodecOptions::default(),
        "nonexistent",
    )
    .unwrap();
    assert!(result.is_none());
}
