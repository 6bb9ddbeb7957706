//! Table-granularity lock manager
//!
//! Exactly one transaction may hold a given table's lock at a time. Waiters
//! queue FIFO and each carries its own deadline, so a transaction stuck
//! behind a long-running writer times out instead of starving forever.
//! Modeled on the teacher's `Arc<Mutex<_>>`-guarded shared engine state,
//! with a `Condvar` standing in for the teacher's compaction worker
//! channel since waiters here block in-process rather than hand off to a
//! background thread.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LockError {
    #[error("timed out waiting for lock on table {0:?}")]
    Timeout(String),

    #[error("internal lock state poisoned")]
    Poisoned,
}

struct TableLock {
    holder: Option<u128>,
    waiters: VecDeque<u128>,
}

struct Inner {
    tables: HashMap<String, TableLock>,
}

/// Shared handle to the engine's table lock manager.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Condvar>,
    default_timeout: Duration,
}

/// RAII guard releasing a held table lock on drop.
pub struct LockGuard {
    manager: LockManager,
    table: String,
    txn_id: u128,
    released: bool,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.manager.release(&self.table, self.txn_id);
        }
    }
}

impl LockManager {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tables: HashMap::new(),
            })),
            notify: Arc::new(Condvar::new()),
            default_timeout,
        }
    }

    /// Acquires the exclusive lock for `table` on behalf of `txn_id`,
    /// blocking FIFO behind any earlier waiters until granted or until
    /// `timeout` elapses.
    ///
    /// Re-acquisition by the transaction that already holds the lock is a
    /// no-op and returns immediately.
    pub fn acquire(
        &self,
        table: &str,
        txn_id: u128,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock().map_err(|_| LockError::Poisoned)?;

        let entry = guard
            .tables
            .entry(table.to_string())
            .or_insert_with(|| TableLock {
                holder: None,
                waiters: VecDeque::new(),
            });

        if entry.holder == Some(txn_id) {
            trace!(table, txn_id, "re-entrant lock acquire is a no-op");
            return Ok(LockGuard {
                manager: self.clone(),
                table: table.to_string(),
                txn_id,
                released: false,
            });
        }

        if entry.holder.is_none() && entry.waiters.is_empty() {
            entry.holder = Some(txn_id);
            return Ok(LockGuard {
                manager: self.clone(),
                table: table.to_string(),
                txn_id,
                released: false,
            });
        }

        entry.waiters.push_back(txn_id);

        loop {
            let now = Instant::now();
            if now >= deadline {
                if let Some(entry) = guard.tables.get_mut(table) {
                    entry.waiters.retain(|id| *id != txn_id);
                }
                warn!(table, txn_id, "lock acquisition timed out");
                return Err(LockError::Timeout(table.to_string()));
            }

            let entry = guard.tables.get(table).expect("table entry present");
            if entry.holder.is_none() && entry.waiters.front() == Some(&txn_id) {
                let entry = guard.tables.get_mut(table).expect("table entry present");
                entry.waiters.pop_front();
                entry.holder = Some(txn_id);
                return Ok(LockGuard {
                    manager: self.clone(),
                    table: table.to_string(),
                    txn_id,
                    released: false,
                });
            }

            let (g, _timeout_result) = self
                .notify
                .wait_timeout(guard, deadline.saturating_duration_since(now))
                .map_err(|_| LockError::Poisoned)?;
            guard = g;
        }
    }

    /// Acquires with this manager's configured default timeout.
    pub fn acquire_default(&self, table: &str, txn_id: u128) -> Result<LockGuard, LockError> {
        self.acquire(table, txn_id, self.default_timeout)
    }

    fn release(&self, table: &str, txn_id: u128) -> Result<(), LockError> {
        let mut guard = self.inner.lock().map_err(|_| LockError::Poisoned)?;
        if let Some(entry) = guard.tables.get_mut(table)
            && entry.holder == Some(txn_id)
        {
            entry.holder = None;
        }
        drop(guard);
        self.notify.notify_all();
        Ok(())
    }
}

impl LockGuard {
    /// Releases the lock early instead of waiting for `Drop`.
    pub fn release(mut self) {
        let _ = self.manager.release(&self.table, self.txn_id);
        self.released = true;
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}
