//! Engine facade
//!
//! The single entry point applications use: owns the store, WAL, index
//! registry, and transaction manager, and wires them together behind a
//! lifecycle (`Ready` → `Closing` → `Closed`), a background checkpoint
//! scheduler, and a best-effort event-listener registry. Everything below
//! this module is usable on its own; this module is the thing most callers
//! actually construct.
//!
//! ## Concurrency model
//!
//! The WAL and index registry are each behind their own `Mutex` — the WAL
//! because its active segment is a shared file handle, the index registry
//! because a commit to any table may touch indexes shared across tables.
//! Table-level concurrency comes from the transaction manager's lock
//! manager, not from these mutexes, which are held only for the duration of
//! a single commit's critical section. This makes the engine a single
//! logical writer, matching the teacher's single `Arc<RwLock<EngineInner>>`
//! in spirit, split into two finer-grained locks since reads never need one.
//!
//! ## Guarantees
//!
//! - **Durability:** every committed operation is WAL-logged before the
//!   table file is rewritten (when the WAL is enabled).
//! - **Crash recovery:** [`Engine::open`] replays every WAL segment found in
//!   the directory and reapplies its operations to the table store before
//!   the engine becomes ready.
//! - **Listener isolation:** a panicking event listener is caught at the
//!   dispatch boundary and logged; it cannot abort a commit in progress.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::CodecOptions;
use crate::crypto::Key;
use crate::index::{Index, IndexError, IndexRegistry};
use crate::lock::{LockError, LockManager};
use crate::model::{generate_id, IndexKind, IsolationLevel, Record};
use crate::query::{self, CmpOp, Filter, Page, QueryError, Sort};
use crate::schema::SchemaError;
use crate::store::{Store, StoreError};
use crate::txn::{self, Applied, BufferedOp, TransactionManager, TxnError};
use crate::wal::{Operation as WalOperation, RecoverySummary, Wal, WalConfig, WalError};

/// Top-level error type returned by every public `Engine` method. Wraps
/// every component's own error type, mirroring the teacher's `EngineError`
/// wrapping `ManifestError`/`MemtableError`/`SSTableError`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("engine is not ready (state: {0:?})")]
    NotReady(EngineState),

    #[error("index {0:?} not found")]
    IndexNotFound(String),
}

/// Engine lifecycle state. An `Engine` value only ever exists once
/// construction has completed, so `Initializing` is never externally
/// observable through [`Engine::state`] — it documents the phase
/// [`Engine::open`] itself is in, not a state a caller can race against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Ready,
    Closing,
    Closed,
}

/// Tunable configuration, validated at [`Engine::open`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Encrypt table and index files. Disabling this is a compatibility
    /// fallback only — new deployments should leave it on.
    pub encrypt: bool,
    /// Gzip-wrap ciphertext before writing table/index files.
    pub compression: bool,
    /// Write a WAL intent before every table rewrite.
    pub wal_enabled: bool,
    /// Flush (and fsync) the WAL segment before a write is acknowledged.
    pub sync_writes: bool,
    /// Byte threshold at which the active WAL segment is rotated.
    pub max_wal_size: u64,
    /// Cadence of the background checkpoint task. Zero disables the
    /// scheduler; checkpoints then only happen on [`Engine::close`].
    pub checkpoint_interval: Duration,
    /// Maximum time a transaction waits to acquire a table lock.
    pub lock_timeout: Duration,
    /// Base block size for WAL plaintext padding.
    pub wal_padding_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encrypt: true,
            compression: false,
            wal_enabled: true,
            sync_writes: true,
            max_wal_size: 64 * 1024 * 1024,
            checkpoint_interval: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(10),
            wal_padding_size: 1024,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.lock_timeout.is_zero() {
            return Err(EngineError::Validation(
                "lock_timeout must be greater than zero".into(),
            ));
        }
        if self.wal_padding_size == 0 {
            return Err(EngineError::Validation(
                "wal_padding_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of engine statistics returned by [`Engine::stats`].
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub table_count: usize,
    pub index_count: usize,
    pub wal_recovered_entries: usize,
    pub wal_recovery_failures: usize,
}

/// Named events an [`Engine::on`] listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Add,
    Update,
    Delete,
    CreateTable,
    DeleteTable,
    CreateIndex,
    CommitTransaction,
    RollbackTransaction,
}

/// Payload delivered to listeners. Borrowed, not owned — a listener cannot
/// take ownership of engine state through an event.
#[derive(Debug, Clone)]
pub enum Event {
    Add { table: String, row: Record },
    Update { table: String, old_row: Record, new_row: Record },
    Delete { table: String, row: Record },
    CreateTable { table: String },
    DeleteTable { table: String },
    CreateIndex { table: String, name: String },
    CommitTransaction { id: u128 },
    RollbackTransaction { id: u128 },
}

impl Event {
    fn kind(&self) -> EventKind {
        match self {
            Event::Add { .. } => EventKind::Add,
            Event::Update { .. } => EventKind::Update,
            Event::Delete { .. } => EventKind::Delete,
            Event::CreateTable { .. } => EventKind::CreateTable,
            Event::DeleteTable { .. } => EventKind::DeleteTable,
            Event::CreateIndex { .. } => EventKind::CreateIndex,
            Event::CommitTransaction { .. } => EventKind::CommitTransaction,
            Event::RollbackTransaction { .. } => EventKind::RollbackTransaction,
        }
    }
}

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

/// A single-column or foreign-key join to apply while querying a table.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub table: String,
    pub local_key: String,
    pub foreign_key: String,
}

/// A full filter/sort/paginate/join request against one table.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub filter: Option<Filter>,
    pub sort: Option<Sort>,
    pub page: Page,
    pub join: Option<JoinSpec>,
}

struct CheckpointHandle {
    shutdown: Option<crossbeam::channel::Sender<()>>,
    join: Option<std::thread::JoinHandle<()>>,
}

struct EngineInner {
    dir: PathBuf,
    codec_opts: CodecOptions,
    store: Store,
    wal: Mutex<Wal>,
    indexes: Mutex<IndexRegistry>,
    txns: TransactionManager,
    master_key: Mutex<Option<Key>>,
    state: Mutex<EngineState>,
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
    recovery_summary: RecoverySummary,
}

/// The engine handle applications hold. Not `Clone` — there is exactly one
/// owner responsible for calling [`Engine::close`].
pub struct Engine {
    inner: Arc<EngineInner>,
    checkpoint: Mutex<CheckpointHandle>,
}

impl Engine {
    /// Opens (creating if absent) an engine rooted at `dir`, replaying any
    /// existing WAL segments and loading any persisted indexes before
    /// returning a ready handle.
    ///
    /// `master_key` is required whenever `config.encrypt` or
    /// `config.wal_enabled` is set.
    pub fn open(
        dir: impl AsRef<Path>,
        master_key: Option<Key>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        if config.encrypt && master_key.is_none() {
            return Err(EngineError::Validation(
                "encryption enabled without a master key".into(),
            ));
        }
        if config.wal_enabled && master_key.is_none() {
            return Err(EngineError::Validation(
                "WAL enabled without a master key".into(),
            ));
        }

        let codec_opts = CodecOptions {
            encrypt: config.encrypt,
            compression: config.compression,
        };

        let store_key = master_key.as_ref().map(|k| Key::new(*k.as_bytes()));
        let store = Store::new(dir.clone(), store_key, codec_opts);

        let wal_config = WalConfig {
            enabled: config.wal_enabled,
            sync_writes: config.sync_writes,
            padding_size: config.wal_padding_size,
            max_wal_size: config.max_wal_size,
            retention: Duration::from_secs(24 * 60 * 60),
        };
        let (wal, recovered, summary) = Wal::open(dir.join("wal"), master_key.as_ref(), wal_config)?;

        for entry in &recovered {
            if let Err(e) = apply_recovered(&store, entry.operation.clone()) {
                warn!(sequence = entry.sequence, error = %e, "failed to reapply recovered WAL entry");
            }
        }
        if !summary.failures.is_empty() {
            warn!(
                failures = summary.failures.len(),
                "WAL recovery encountered unreadable entries"
            );
        }

        let index_key = master_key.as_ref().map(|k| Key::new(*k.as_bytes()));
        let indexes = discover_indexes(&dir, index_key, codec_opts)?;

        let locks = LockManager::new(config.lock_timeout);
        let txns = TransactionManager::new(locks, config.lock_timeout);

        let inner = Arc::new(EngineInner {
            dir: dir.clone(),
            codec_opts,
            store,
            wal: Mutex::new(wal),
            indexes: Mutex::new(indexes),
            txns,
            master_key: Mutex::new(master_key),
            state: Mutex::new(EngineState::Ready),
            listeners: Mutex::new(HashMap::new()),
            recovery_summary: summary,
        });

        let checkpoint = if config.wal_enabled && !config.checkpoint_interval.is_zero() {
            let (tx, join) = spawn_checkpoint_thread(Arc::clone(&inner), config.checkpoint_interval);
            CheckpointHandle {
                shutdown: Some(tx),
                join: Some(join),
            }
        } else {
            CheckpointHandle {
                shutdown: None,
                join: None,
            }
        };

        info!(dir = %dir.display(), "engine ready");
        Ok(Self {
            inner,
            checkpoint: Mutex::new(checkpoint),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.lock().expect("engine state mutex poisoned")
    }

    /// Returns `Ok(())` once the engine is ready to accept operations, or
    /// the reason it cannot.
    pub fn ready(&self) -> Result<(), EngineError> {
        self.ensure_ready()
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.state() {
            EngineState::Ready => Ok(()),
            other => Err(EngineError::NotReady(other)),
        }
    }

    /// Registers a best-effort listener for `kind`. A panicking listener is
    /// caught and logged; it never aborts the commit that triggered it.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&Event) + Send + Sync + 'static) {
        self.inner
            .listeners
            .lock()
            .expect("listener registry mutex poisoned")
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let listeners = self
            .inner
            .listeners
            .lock()
            .expect("listener registry mutex poisoned");
        let Some(handlers) = listeners.get(&kind) else {
            return;
        };
        for handler in handlers {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(?kind, "event listener panicked; ignoring");
            }
        }
    }

    fn dispatch_commit(&self, applied: Vec<Applied>, txn_id: u128) {
        for a in &applied {
            self.dispatch(applied_to_event(a));
        }
        self.dispatch(Event::CommitTransaction { id: txn_id });
    }

    fn run_commit(&self, id: u128) -> Result<Vec<Applied>, EngineError> {
        let mut wal = self.inner.wal.lock().expect("WAL mutex poisoned");
        let mut indexes = self.inner.indexes.lock().expect("index registry mutex poisoned");
        let applied = self.inner.txns.commit(id, &self.inner.store, &wal, &mut indexes)?;

        match wal.maybe_rotate() {
            Ok(true) => match wal.checkpoint() {
                Ok(removed) => debug!(removed, "maxWalSize exceeded, checkpoint reclaimed segments"),
                Err(e) => warn!(error = %e, "size-triggered checkpoint failed"),
            },
            Ok(false) => {}
            Err(e) => warn!(error = %e, "size-based WAL rotation check failed"),
        }

        Ok(applied)
    }

    /// Starts a new transaction, returning its id. Operations buffered
    /// against this id take effect only at [`Engine::commit_transaction`].
    pub fn start_transaction(&self, isolation: IsolationLevel) -> Result<u128, EngineError> {
        self.ensure_ready()?;
        Ok(self.inner.txns.start(isolation))
    }

    pub fn commit_transaction(&self, id: u128) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let applied = self.run_commit(id)?;
        debug!(txn = %format!("{id:#x}"), ops = applied.len(), "transaction committed");
        self.dispatch_commit(applied, id);
        Ok(())
    }

    pub fn rollback_transaction(&self, id: u128) -> Result<(), EngineError> {
        self.ensure_ready()?;
        self.inner.txns.rollback(id)?;
        self.dispatch(Event::RollbackTransaction { id });
        Ok(())
    }

    pub fn create_table(&self, table: &str, schema: Option<Value>) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let id = self.inner.txns.start(IsolationLevel::ReadCommitted);
        self.inner.txns.buffer(
            id,
            BufferedOp::CreateTable {
                table: table.to_string(),
                schema,
            },
        )?;
        let applied = self.run_commit(id)?;
        self.dispatch_commit(applied, id);
        Ok(())
    }

    pub fn delete_table(&self, table: &str) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let id = self.inner.txns.start(IsolationLevel::ReadCommitted);
        self.inner.txns.buffer(
            id,
            BufferedOp::DeleteTable {
                table: table.to_string(),
            },
        )?;
        let applied = self.run_commit(id)?;
        self.dispatch_commit(applied, id);
        Ok(())
    }

    /// Inserts `row`, assigning a fresh `id` if the caller did not supply
    /// one. When `txn` is `Some`, the insert is buffered against that
    /// transaction and takes effect only at commit; the returned row
    /// reflects the assigned id regardless.
    pub fn add_data(
        &self,
        table: &str,
        mut row: Record,
        txn: Option<u128>,
    ) -> Result<Record, EngineError> {
        self.ensure_ready()?;
        if !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(generate_id()));
        }

        match txn {
            Some(id) => {
                self.inner.txns.buffer(
                    id,
                    BufferedOp::Add {
                        table: table.to_string(),
                        row: row.clone(),
                    },
                )?;
                Ok(row)
            }
            None => {
                let id = self.inner.txns.start(IsolationLevel::ReadCommitted);
                self.inner.txns.buffer(
                    id,
                    BufferedOp::Add {
                        table: table.to_string(),
                        row: row.clone(),
                    },
                )?;
                let applied = self.run_commit(id)?;
                self.dispatch_commit(applied, id);
                Ok(row)
            }
        }
    }

    pub fn update_data(
        &self,
        table: &str,
        row_id: &str,
        new_row: Record,
        txn: Option<u128>,
    ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let op = BufferedOp::Update {
            table: table.to_string(),
            id: row_id.to_string(),
            new_row,
        };

        match txn {
            Some(id) => {
                self.inner.txns.buffer(id, op)?;
                Ok(())
            }
            None => {
                let id = self.inner.txns.start(IsolationLevel::ReadCommitted);
                self.inner.txns.buffer(id, op)?;
                let applied = self.run_commit(id)?;
                self.dispatch_commit(applied, id);
                Ok(())
            }
        }
    }

    pub fn delete_data(&self, table: &str, row_id: &str, txn: Option<u128>) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let op = BufferedOp::Delete {
            table: table.to_string(),
            id: row_id.to_string(),
        };

        match txn {
            Some(id) => {
                self.inner.txns.buffer(id, op)?;
                Ok(())
            }
            None => {
                let id = self.inner.txns.start(IsolationLevel::ReadCommitted);
                self.inner.txns.buffer(id, op)?;
                let applied = self.run_commit(id)?;
                self.dispatch_commit(applied, id);
                Ok(())
            }
        }
    }

    /// Builds a secondary index over `table`, failing if the existing data
    /// already violates `unique`.
    pub fn create_index(
        &self,
        table: &str,
        name: &str,
        columns: Vec<String>,
        unique: bool,
        kind: IndexKind,
    ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let file = self.inner.store.load_existing(table)?;
        let key = self
            .inner
            .master_key
            .lock()
            .expect("master key mutex poisoned")
            .as_ref()
            .map(|k| Key::new(*k.as_bytes()));

        let index = Index::create(
            self.inner.dir.clone(),
            key,
            self.inner.codec_opts,
            table,
            name,
            columns,
            unique,
            kind,
            &file.rows,
        )?;
        self.inner
            .indexes
            .lock()
            .expect("index registry mutex poisoned")
            .insert(index);
        self.dispatch(Event::CreateIndex {
            table: table.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let mut indexes = self.inner.indexes.lock().expect("index registry mutex poisoned");
        let index = indexes
            .remove(name)
            .ok_or_else(|| EngineError::IndexNotFound(name.to_string()))?;
        drop(indexes);
        let path = index.file_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Filters, optionally joins, sorts, and paginates `table`'s rows.
    pub fn query(&self, table: &str, spec: &QuerySpec) -> Result<Vec<Record>, EngineError> {
        self.ensure_ready()?;
        let file = self.inner.store.load_existing(table)?;
        let mut rows = self.resolve_rows(table, &file.rows, spec.filter.as_ref())?;

        if let Some(join) = &spec.join {
            for row in &mut rows {
                if let Some(key_value) = row.get(&join.local_key).cloned() {
                    if let Some(joined) =
                        txn::load_join_target(&self.inner.store, &join.table, &join.foreign_key, &key_value)?
                    {
                        *row = query::join_merge(row, &joined);
                    }
                }
            }
        }

        if let Some(sort_spec) = &spec.sort {
            query::sort(&mut rows, sort_spec);
        }

        Ok(query::paginate(rows, &spec.page))
    }

    /// Resolves the rows matching `filter`, taking the index-assisted path
    /// when `filter` is a single top-level equality condition covered by an
    /// index on `table`, and falling back to a full scan otherwise.
    fn resolve_rows(
        &self,
        table: &str,
        rows: &[Record],
        filter: Option<&Filter>,
    ) -> Result<Vec<Record>, EngineError> {
        let Some(filter) = filter else {
            return Ok(rows.to_vec());
        };

        if let Filter::Condition(c) = filter
            && c.operator == CmpOp::Eq
        {
            let indexes = self.inner.indexes.lock().expect("index registry mutex poisoned");
            let candidates = indexes.for_table(table);
            if let Some((_, ids)) = query::index_assisted_ids(c, &candidates) {
                let id_set: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
                return Ok(rows
                    .iter()
                    .filter(|r| {
                        r.get("id")
                            .and_then(Value::as_str)
                            .map(|id| id_set.contains(id))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect());
            }
        }

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if query::matches(filter, row)? {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    pub fn get_wal_recovery_summary(&self) -> RecoverySummary {
        self.inner.recovery_summary.clone()
    }

    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let mut table_count = 0;
        for entry in fs::read_dir(&self.inner.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("db") {
                table_count += 1;
            }
        }
        let index_count = self
            .inner
            .indexes
            .lock()
            .expect("index registry mutex poisoned")
            .names()
            .count();

        Ok(EngineStats {
            table_count,
            index_count,
            wal_recovered_entries: self.inner.recovery_summary.entries_applied,
            wal_recovery_failures: self.inner.recovery_summary.failures.len(),
        })
    }

    /// Gracefully shuts the engine down: cancels the checkpoint scheduler,
    /// runs one final checkpoint, clears in-memory index state, and
    /// zeroizes the master key and derived WAL key. Safe to call more than
    /// once.
    pub fn close(&self) -> Result<(), EngineError> {
        {
            let mut state = self.inner.state.lock().expect("engine state mutex poisoned");
            if *state == EngineState::Closed {
                return Ok(());
            }
            *state = EngineState::Closing;
        }

        {
            let mut checkpoint = self.checkpoint.lock().expect("checkpoint mutex poisoned");
            if let Some(tx) = checkpoint.shutdown.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = checkpoint.join.take() {
                let _ = handle.join();
            }
        }

        if let Ok(wal) = self.inner.wal.lock() {
            if let Err(e) = wal.checkpoint() {
                warn!(error = %e, "final checkpoint failed during close");
            }
        }

        if let Ok(mut indexes) = self.inner.indexes.lock() {
            indexes.clear();
        }

        // Drop order matters here: the master key and the WAL's derived key
        // are zeroized as soon as they are taken, not deferred to whenever
        // the engine's Arc finally drops.
        if let Ok(mut key) = self.inner.master_key.lock() {
            key.take();
        }
        if let Ok(mut wal) = self.inner.wal.lock() {
            wal.take_key();
        }

        *self.inner.state.lock().expect("engine state mutex poisoned") = EngineState::Closed;
        info!("engine closed");
        Ok(())
    }
}

fn applied_to_event(applied: &Applied) -> Event {
    match applied.clone() {
        Applied::Added { table, row } => Event::Add { table, row },
        Applied::Updated {
            table,
            old_row,
            new_row,
        } => Event::Update {
            table,
            old_row,
            new_row,
        },
        Applied::Deleted { table, row } => Event::Delete { table, row },
        Applied::TableCreated { table } => Event::CreateTable { table },
        Applied::TableDeleted { table } => Event::DeleteTable { table },
    }
}

/// Reapplies one recovered WAL operation to the table store. Idempotent:
/// a table that already reflects the operation (because the crash happened
/// after the table rewrite but before WAL truncation) is left as-is rather
/// than erroring.
fn apply_recovered(store: &Store, operation: WalOperation) -> Result<(), StoreError> {
    match operation {
        WalOperation::CreateTable { table, schema } => match store.create(&table, schema) {
            Ok(_) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        },
        WalOperation::DeleteTable { table } => match store.delete(&table) {
            Ok(()) => Ok(()),
            Err(e) => Err(e),
        },
        WalOperation::Write { table, rows } => {
            if store.exists(&table) {
                store.replace_rows(&table, rows).map(|_| ())
            } else {
                store.create(&table, None)?;
                store.replace_rows(&table, rows).map(|_| ())
            }
        }
    }
}

fn discover_indexes(dir: &Path, key: Option<Key>, opts: CodecOptions) -> Result<IndexRegistry, EngineError> {
    let mut registry = IndexRegistry::new();
    let indexes_dir = dir.join("indexes");
    if !indexes_dir.exists() {
        return Ok(registry);
    }
    for entry in fs::read_dir(&indexes_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("idx") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let key_copy = key.as_ref().map(|k| Key::new(*k.as_bytes()));
        if let Some(index) = Index::load(dir, key_copy, opts, name)? {
            registry.insert(index);
        }
    }
    Ok(registry)
}

fn spawn_checkpoint_thread(
    inner: Arc<EngineInner>,
    interval: Duration,
) -> (crossbeam::channel::Sender<()>, std::thread::JoinHandle<()>) {
    let (tx, rx) = crossbeam::channel::unbounded();
    let handle = std::thread::spawn(move || loop {
        match rx.recv_timeout(interval) {
            Ok(()) => break,
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => {
                let wal = match inner.wal.lock() {
                    Ok(wal) => wal,
                    Err(_) => break,
                };
                match wal.checkpoint() {
                    Ok(removed) if removed > 0 => debug!(removed, "checkpoint reclaimed WAL segments"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "scheduled checkpoint failed"),
                }
            }
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
        }
    });
    (tx, handle)
}
