//! Table store
//!
//! Owns the on-disk representation of one table: a single file holding the
//! full row sequence plus metadata, loaded and persisted whole through
//! [`crate::codec`]. There is no page-level update — every committed
//! mutation rewrites the entire file. This mirrors the teacher's SSTable
//! design note that a table, once written, is replaced rather than patched;
//! the difference here is that the "immutable unit" is a JSON document
//! rather than a sorted run of key-value blocks.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::codec::{self, CodecError, CodecOptions};
use crate::crypto::Key;
use crate::model::{Record, TableFile};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("table {0:?} does not exist")]
    NotFound(String),

    #[error("table {0:?} already exists")]
    AlreadyExists(String),
}

/// Directory-rooted handle for a table's on-disk file.
pub struct Store {
    dir: PathBuf,
    key: Option<Key>,
    opts: CodecOptions,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, key: Option<Key>, opts: CodecOptions) -> Self {
        Self {
            dir: dir.into(),
            key,
            opts,
        }
    }

    fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.db"))
    }

    /// Loads a table file, or `None` if it has never been created.
    pub fn load(&self, table: &str) -> Result<Option<TableFile>, StoreError> {
        Ok(codec::read(
            &self.path_for(table),
            self.key.as_ref(),
            self.opts,
        )?)
    }

    /// Loads a table file, erroring if it does not exist.
    pub fn load_existing(&self, table: &str) -> Result<TableFile, StoreError> {
        self.load(table)?
            .ok_or_else(|| StoreError::NotFound(table.to_string()))
    }

    pub fn exists(&self, table: &str) -> bool {
        self.path_for(table).exists()
    }

    /// Creates a brand new, empty table file with the given schema.
    pub fn create(
        &self,
        table: &str,
        schema: Option<serde_json::Value>,
    ) -> Result<TableFile, StoreError> {
        if self.exists(table) {
            return Err(StoreError::AlreadyExists(table.to_string()));
        }
        let file = TableFile {
            name: table.to_string(),
            schema,
            rows: Vec::new(),
            last_modified: now_ms(),
        };
        self.persist(&file)?;
        Ok(file)
    }

    /// Rewrites the full table file.
    pub fn persist(&self, file: &TableFile) -> Result<(), StoreError> {
        codec::write_atomic(&self.path_for(&file.name), file, self.key.as_ref(), self.opts)?;
        Ok(())
    }

    /// Replaces a table's row sequence and bumps its modification time.
    pub fn replace_rows(&self, table: &str, rows: Vec<Record>) -> Result<TableFile, StoreError> {
        let mut file = self.load_existing(table)?;
        file.rows = rows;
        file.last_modified = now_ms();
        self.persist(&file)?;
        Ok(file)
    }

    pub fn delete(&self, table: &str) -> Result<(), StoreError> {
        let path = self.path_for(table);
        if path.exists() {
            std::fs::remove_file(path).map_err(CodecError::Io)?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}
