//! Transaction manager
//!
//! A transaction buffers operations in memory; nothing reaches disk until
//! [`TransactionManager::commit`]. Commit acquires every table lock the
//! buffer touches, then — for each buffered operation, in buffer order —
//! logs a WAL intent, rewrites the table, and updates its indexes.
//! Transactions are addressed by id through an arena rather than held as
//! long-lived references, the same discipline the teacher applies to
//! SSTable and WAL-segment handles so the lock manager and the arena never
//! end up holding references into each other.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::RngCore;
use thiserror::Error;
use tracing::{debug, warn};

use crate::index::{IndexError, IndexRegistry};
use crate::lock::{LockError, LockGuard, LockManager};
use crate::model::{IsolationLevel, Record};
use crate::schema::{self, SchemaError};
use crate::store::{Store, StoreError};
use crate::wal::{Operation as WalOperation, Wal, WalError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TxnError {
    #[error("transaction {0:#x} not found")]
    NotFound(u128),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("row {0:?} not found in table {1:?}")]
    RowNotFound(String, String),

    #[error("table {0:?} not found")]
    TableNotFound(String),
}

/// One buffered mutation. Applied in order, only at commit.
#[derive(Debug, Clone)]
pub enum BufferedOp {
    Add {
        table: String,
        row: Record,
    },
    Update {
        table: String,
        id: String,
        new_row: Record,
    },
    Delete {
        table: String,
        id: String,
    },
    CreateTable {
        table: String,
        schema: Option<serde_json::Value>,
    },
    DeleteTable {
        table: String,
    },
}

fn op_table(op: &BufferedOp) -> &str {
    match op {
        BufferedOp::Add { table, .. }
        | BufferedOp::Update { table, .. }
        | BufferedOp::Delete { table, .. }
        | BufferedOp::CreateTable { table, .. }
        | BufferedOp::DeleteTable { table } => table,
    }
}

/// A committed mutation, reported back to the engine facade so it can
/// dispatch the matching event.
#[derive(Debug, Clone)]
pub enum Applied {
    Added { table: String, row: Record },
    Updated { table: String, old_row: Record, new_row: Record },
    Deleted { table: String, row: Record },
    TableCreated { table: String },
    TableDeleted { table: String },
}

struct Transaction {
    isolation: IsolationLevel,
    buffer: Vec<BufferedOp>,
    start: Instant,
    /// Reserved for a future `REPEATABLE_READ` implementation; unused today.
    #[allow(dead_code)]
    snapshot: Option<HashMap<String, Vec<Record>>>,
}

/// Owns the transaction arena and orchestrates commit/rollback against the
/// shared store, index registry, WAL, and lock manager.
pub struct TransactionManager {
    arena: Mutex<HashMap<u128, Transaction>>,
    locks: LockManager,
    lock_timeout: Duration,
}

impl TransactionManager {
    pub fn new(locks: LockManager, lock_timeout: Duration) -> Self {
        Self {
            arena: Mutex::new(HashMap::new()),
            locks,
            lock_timeout,
        }
    }

    pub fn start(&self, isolation: IsolationLevel) -> u128 {
        let id = generate_txn_id();
        let txn = Transaction {
            isolation,
            buffer: Vec::new(),
            start: Instant::now(),
            snapshot: None,
        };
        self.arena.lock().expect("txn arena poisoned").insert(id, txn);
        debug!(txn = %format!("{id:#x}"), ?isolation, "started transaction");
        id
    }

    pub fn buffer(&self, id: u128, op: BufferedOp) -> Result<(), TxnError> {
        let mut arena = self.arena.lock().expect("txn arena poisoned");
        let txn = arena.get_mut(&id).ok_or(TxnError::NotFound(id))?;
        txn.buffer.push(op);
        Ok(())
    }

    pub fn isolation_level(&self, id: u128) -> Result<IsolationLevel, TxnError> {
        let arena = self.arena.lock().expect("txn arena poisoned");
        Ok(arena.get(&id).ok_or(TxnError::NotFound(id))?.isolation)
    }

    /// Discards the buffer without touching disk and releases any locks
    /// implicitly held (there are none before commit starts, since locks
    /// are only acquired during commit — rollback before commit is a pure
    /// in-memory drop).
    pub fn rollback(&self, id: u128) -> Result<(), TxnError> {
        let mut arena = self.arena.lock().expect("txn arena poisoned");
        arena.remove(&id).ok_or(TxnError::NotFound(id))?;
        debug!(txn = %format!("{id:#x}"), "rolled back transaction");
        Ok(())
    }

    /// Applies every buffered operation atomically: WAL intent, then table
    /// rewrite, then index maintenance, in buffer order. Releases every
    /// lock taken for the commit before returning, success or failure.
    pub fn commit(
        &self,
        id: u128,
        store: &Store,
        wal: &Wal,
        indexes: &mut IndexRegistry,
    ) -> Result<Vec<Applied>, TxnError> {
        let buffer = {
            let mut arena = self.arena.lock().expect("txn arena poisoned");
            let txn = arena.remove(&id).ok_or(TxnError::NotFound(id))?;
            txn.buffer
        };

        let mut guards: Vec<LockGuard> = Vec::new();
        let mut locked: Vec<String> = Vec::new();
        for op in &buffer {
            let table = op_table(op).to_string();
            if !locked.contains(&table) {
                let guard = self.locks.acquire(&table, id, self.lock_timeout)?;
                locked.push(table);
                guards.push(guard);
            }
        }

        match self.apply_buffer(buffer, store, wal, indexes) {
            Ok(applied) => {
                debug!(txn = %format!("{id:#x}"), ops = applied.len(), "committed transaction");
                Ok(applied)
            }
            Err(e) => {
                warn!(txn = %format!("{id:#x}"), error = %e, "commit failed, rolled back");
                Err(e)
            }
        }
        // `guards` drops here, releasing every lock regardless of outcome.
    }

    fn apply_buffer(
        &self,
        buffer: Vec<BufferedOp>,
        store: &Store,
        wal: &Wal,
        indexes: &mut IndexRegistry,
    ) -> Result<Vec<Applied>, TxnError> {
        let mut applied = Vec::with_capacity(buffer.len());

        for op in buffer {
            match op {
                BufferedOp::CreateTable { table, schema } => {
                    if wal.is_enabled() {
                        wal.append(WalOperation::CreateTable {
                            table: table.clone(),
                            schema: schema.clone(),
                        })?;
                    }
                    store.create(&table, schema)?;
                    applied.push(Applied::TableCreated { table });
                }
                BufferedOp::DeleteTable { table } => {
                    if wal.is_enabled() {
                        wal.append(WalOperation::DeleteTable {
                            table: table.clone(),
                        })?;
                    }
                    store.delete(&table)?;
                    indexes.drop_table_indexes(&table);
                    applied.push(Applied::TableDeleted { table });
                }
                BufferedOp::Add { table, row } => {
                    let file = store.load_existing(&table)?;
                    schema::validate(file.schema.as_ref(), &row)?;
                    for index in indexes.for_table(&table) {
                        index.check_unique(&row)?;
                    }

                    let mut rows = file.rows;
                    rows.push(row.clone());
                    if wal.is_enabled() {
                        wal.append(WalOperation::Write {
                            table: table.clone(),
                            rows: rows.clone(),
                        })?;
                    }
                    store.replace_rows(&table, rows)?;
                    for index in indexes.for_table_mut(&table) {
                        index.insert(&row);
                        index.persist()?;
                    }
                    applied.push(Applied::Added { table, row });
                }
                BufferedOp::Update { table, id, new_row } => {
                    let file = store.load_existing(&table)?;
                    schema::validate(file.schema.as_ref(), &new_row)?;

                    let mut rows = file.rows;
                    let position = rows
                        .iter()
                        .position(|r| r.get("id").and_then(|v| v.as_str()) == Some(id.as_str()))
                        .ok_or_else(|| TxnError::RowNotFound(id.clone(), table.clone()))?;
                    let old_row = rows[position].clone();

                    for index in indexes.for_table(&table) {
                        index.check_reindex(&old_row, &new_row)?;
                    }

                    rows[position] = new_row.clone();
                    if wal.is_enabled() {
                        wal.append(WalOperation::Write {
                            table: table.clone(),
                            rows: rows.clone(),
                        })?;
                    }
                    store.replace_rows(&table, rows)?;
                    for index in indexes.for_table_mut(&table) {
                        index.reindex(&old_row, &new_row)?;
                        index.persist()?;
                    }
                    applied.push(Applied::Updated {
                        table,
                        old_row,
                        new_row,
                    });
                }
                BufferedOp::Delete { table, id } => {
                    let file = store.load_existing(&table)?;
                    let mut rows = file.rows;
                    let position = rows
                        .iter()
                        .position(|r| r.get("id").and_then(|v| v.as_str()) == Some(id.as_str()))
                        .ok_or_else(|| TxnError::RowNotFound(id.clone(), table.clone()))?;
                    let removed = rows.remove(position);

                    if wal.is_enabled() {
                        wal.append(WalOperation::Write {
                            table: table.clone(),
                            rows: rows.clone(),
                        })?;
                    }
                    store.replace_rows(&table, rows)?;
                    for index in indexes.for_table_mut(&table) {
                        index.remove(&removed);
                        index.persist()?;
                    }
                    applied.push(Applied::Deleted {
                        table,
                        row: removed,
                    });
                }
            }
        }

        Ok(applied)
    }
}

fn generate_txn_id() -> u128 {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    u128::from_le_bytes(bytes)
}

// Used by the query engine when resolving a filter's join clause against a
// foreign table loaded through the same `Store`.
pub fn load_join_target(
    store: &Store,
    table: &str,
    foreign_key: &str,
    key_value: &serde_json::Value,
) -> Result<Option<Record>, TxnError> {
    let file = store.load_existing(table)?;
    Ok(file
        .rows
        .into_iter()
        .find(|r| r.get(foreign_key) == Some(key_value)))
}
