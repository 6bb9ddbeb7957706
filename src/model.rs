//! Shared data shapes used across the storage, index, transaction, and query
//! modules.
//!
//! These are plain serializable structs rather than behavior-carrying types;
//! the behavior lives in the modules that own the corresponding on-disk or
//! in-memory structure (`store`, `index`, `txn`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single JSON-shaped row. The `id` field is always present once a record
/// has been assigned to a table.
pub type Record = Map<String, Value>;

/// Full contents of one table file: the row sequence plus enough metadata
/// to validate future writes and report staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFile {
    pub name: String,
    #[serde(default)]
    pub schema: Option<Value>,
    pub rows: Vec<Record>,
    pub last_modified: u64,
}

/// Declared index shape, persisted beside the table it indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub kind: IndexKind,
    /// Composite key (columns joined with `::`) -> ids sharing that key.
    pub entries: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Btree,
    Hash,
}

/// Declared transaction isolation level.
///
/// Every level except the absence of one behaves identically today: the
/// lock manager always grants one table to one transaction at a time, which
/// is strictly stronger than `READ_UNCOMMITTED`/`READ_COMMITTED` require.
/// `REPEATABLE_READ` is accepted but not yet given its own snapshot
/// semantics — see [`crate::txn::Transaction::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Builds a composite index key by joining column values with `::`.
pub fn index_key(row: &Record, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| match row.get(c) {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join("::")
}

/// Generates a fresh, opaque record identifier: 128 random bits as lowercase hex.
pub fn generate_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
