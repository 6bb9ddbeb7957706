//! In-memory secondary indexes
//!
//! An index mirrors the `manifest` component's in-memory-plus-persisted-file
//! shape: a `BTreeMap` kept in sync with every commit, flushed to a sibling
//! file through [`crate::codec`] so it survives a restart without a full
//! table scan to rebuild it.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::{self, CodecError, CodecOptions};
use crate::crypto::Key;
use crate::model::{index_key, IndexFile, IndexKind, Record};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IndexError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("index {0:?} would violate uniqueness for key {1:?}")]
    UniqueViolation(String, String),

    #[error("index {0:?} does not exist")]
    NotFound(String),
}

/// One secondary index over a single table.
pub struct Index {
    dir: PathBuf,
    key: Option<Key>,
    opts: CodecOptions,
    file: IndexFile,
}

impl Index {
    fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join("indexes").join(format!("{name}.idx"))
    }

    /// Builds a brand new index over the given rows, failing if the data
    /// already violates a requested uniqueness constraint.
    pub fn create(
        dir: impl Into<PathBuf>,
        key: Option<Key>,
        opts: CodecOptions,
        table: &str,
        name: &str,
        columns: Vec<String>,
        unique: bool,
        kind: IndexKind,
        rows: &[Record],
    ) -> Result<Self, IndexError> {
        let dir = dir.into();
        let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            let id = row
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let k = index_key(row, &columns);
            let bucket = entries.entry(k.clone()).or_default();
            if unique && !bucket.is_empty() {
                return Err(IndexError::UniqueViolation(name.to_string(), k));
            }
            bucket.push(id);
        }

        let file = IndexFile {
            table: table.to_string(),
            name: name.to_string(),
            columns,
            unique,
            kind,
            entries,
        };

        let index = Self {
            dir,
            key,
            opts,
            file,
        };
        index.persist()?;
        Ok(index)
    }

    /// Loads a previously persisted index, or `None` if it doesn't exist.
    pub fn load(
        dir: impl Into<PathBuf>,
        key: Option<Key>,
        opts: CodecOptions,
        name: &str,
    ) -> Result<Option<Self>, IndexError> {
        let dir = dir.into();
        let path = Self::path_for(&dir, name);
        let Some(file) = codec::read::<IndexFile>(&path, key.as_ref(), opts)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            dir,
            key,
            opts,
            file,
        }))
    }

    pub fn persist(&self) -> Result<(), IndexError> {
        codec::write_atomic(
            &Self::path_for(&self.dir, &self.file.name),
            &self.file,
            self.key.as_ref(),
            self.opts,
        )?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn columns(&self) -> &[String] {
        &self.file.columns
    }

    pub fn is_unique(&self) -> bool {
        self.file.unique
    }

    /// Record ids whose indexed columns equal `value`'s rendering for a
    /// single-column index. For compound indexes, callers build the
    /// composite key via [`crate::model::index_key`] directly.
    pub fn lookup(&self, composite_key: &str) -> &[String] {
        self.file
            .entries
            .get(composite_key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Checks whether `row` covers every column this index is built over.
    pub fn applies_to(&self, column: &str) -> bool {
        self.file.columns.first().map(|c| c == column).unwrap_or(false)
    }

    /// Validates (without applying) that inserting `row` would not violate
    /// uniqueness.
    pub fn check_unique(&self, row: &Record) -> Result<(), IndexError> {
        if !self.file.unique {
            return Ok(());
        }
        let k = index_key(row, &self.file.columns);
        if self.file.entries.contains_key(&k) {
            return Err(IndexError::UniqueViolation(self.file.name.clone(), k));
        }
        Ok(())
    }

    /// Adds `row` to the index. Caller must have already validated
    /// uniqueness via [`Index::check_unique`] if required.
    pub fn insert(&mut self, row: &Record) {
        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let k = index_key(row, &self.file.columns);
        self.file.entries.entry(k).or_default().push(id);
    }

    /// Removes `row`'s id from whichever bucket it currently occupies.
    pub fn remove(&mut self, row: &Record) {
        let id = row.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        let k = index_key(row, &self.file.columns);
        if let Some(bucket) = self.file.entries.get_mut(&k) {
            bucket.retain(|existing| existing != id);
            if bucket.is_empty() {
                self.file.entries.remove(&k);
            }
        }
    }

    /// Read-only precheck for [`Index::reindex`]: would moving `old_row` to
    /// `new_row`'s bucket violate uniqueness? Used to validate every
    /// affected index before any of them are mutated.
    pub fn check_reindex(&self, old_row: &Record, new_row: &Record) -> Result<(), IndexError> {
        let old_key = index_key(old_row, &self.file.columns);
        let new_key = index_key(new_row, &self.file.columns);
        if old_key == new_key {
            return Ok(());
        }
        self.check_unique(new_row)
    }

    /// Moves `row`'s id from its old bucket to its new one when an update
    /// changes one or more indexed columns.
    pub fn reindex(&mut self, old_row: &Record, new_row: &Record) -> Result<(), IndexError> {
        let old_key = index_key(old_row, &self.file.columns);
        let new_key = index_key(new_row, &self.file.columns);
        if old_key == new_key {
            return Ok(());
        }
        self.check_unique(new_row)?;
        self.remove(old_row);
        self.insert(new_row);
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.file.table
    }

    /// Path of the persisted index file, for callers that need to remove it
    /// from disk (e.g. dropping an index).
    pub fn file_path(&self) -> PathBuf {
        Self::path_for(&self.dir, &self.file.name)
    }
}

/// All indexes currently loaded for an engine instance, keyed by name.
///
/// Owned by the engine facade and handed to [`crate::txn`] commit logic and
/// to [`crate::query`] lookups so both see the same live buckets. `order`
/// tracks insertion order alongside `by_name` so that `for_table`/
/// `for_table_mut` can offer a deterministic "first in insertion order"
/// tie-break for index-assisted lookups, which a plain `HashMap` iteration
/// order cannot guarantee.
#[derive(Default)]
pub struct IndexRegistry {
    by_name: std::collections::HashMap<String, Index>,
    order: Vec<String>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: Index) {
        let name = index.name().to_string();
        if self.by_name.insert(name.clone(), index).is_none() {
            self.order.push(name);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Index> {
        let removed = self.by_name.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&Index> {
        self.by_name.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Index> {
        self.by_name.get_mut(name)
    }

    /// Every index currently built over `table`, in insertion order.
    pub fn for_table(&self, table: &str) -> Vec<&Index> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .filter(|i| i.table() == table)
            .collect()
    }

    /// Every index currently built over `table`, mutably, in insertion order.
    pub fn for_table_mut(&mut self, table: &str) -> Vec<&mut Index> {
        let order = &self.order;
        let mut out: Vec<&mut Index> = self
            .by_name
            .values_mut()
            .filter(|i| i.table() == table)
            .collect();
        out.sort_by_key(|i| order.iter().position(|n| n == i.name()).unwrap_or(usize::MAX));
        out
    }

    /// Drops every index built over `table` (called when the table itself
    /// is deleted).
    pub fn drop_table_indexes(&mut self, table: &str) {
        let dropped: Vec<String> = self
            .by_name
            .iter()
            .filter(|(_, i)| i.table() == table)
            .map(|(name, _)| name.clone())
            .collect();
        self.by_name.retain(|_, i| i.table() != table);
        self.order.retain(|n| !dropped.contains(n));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Drops every index, discarding in-memory state. Does not touch
    /// persisted index files.
    pub fn clear(&mut self) {
        self.by_name.clear();
        self.order.clear();
    }
}
