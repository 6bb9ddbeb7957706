//! # sealdb
//!
//! An embeddable, authenticated, single-writer JSON document store. Every
//! table is a single AES-256-GCM encrypted file; every mutation is
//! WAL-logged before the table is rewritten whole, so a crash mid-write
//! always leaves either the old table contents or a replayable WAL entry —
//! never a half-written file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Engine                            │
//! │  ┌────────────┐ ┌───────────────┐ ┌────────────────────┐ │
//! │  │    WAL     │ │  TransactionMgr│ │   IndexRegistry    │ │
//! │  │ (intents)  │ │ (buffer+commit)│ │ (secondary lookups) │ │
//! │  └─────┬──────┘ └───────┬───────┘ └──────────┬──────────┘ │
//! │        │  intent logged  │ applies in order    │ maintained│
//! │        └────────────────►│◄────────────────────┘          │
//! │                          ▼                                │
//! │                  ┌──────────────┐                         │
//! │                  │    Store     │  whole-table rewrite     │
//! │                  │ (.db files)  │  via crypto + codec       │
//! │                  └──────────────┘                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`crypto`] | AES-256-GCM encryption and PBKDF2 key derivation |
//! | [`codec`] | Encodes/decodes a value to/from an encrypted, optionally compressed file |
//! | [`model`] | Shared record, schema, and index file shapes |
//! | [`schema`] | Structural JSON schema validation (`type`/`properties`/`required`) |
//! | [`store`] | Whole-table read/rewrite on top of [`codec`] |
//! | [`wal`] | Write-ahead log: append, replay, checkpoint |
//! | [`index`] | In-memory secondary indexes, persisted as sibling files |
//! | [`lock`] | Per-table exclusive locking with FIFO waiters |
//! | [`txn`] | Buffered transactions: stage operations, apply atomically at commit |
//! | [`query`] | Filter/sort/paginate/join evaluation over a table's rows |
//! | [`engine`] | The public facade gluing everything above together |
//!
//! ## Key Features
//!
//! - **Authenticated encryption** — every table and index file is sealed
//!   with AES-256-GCM; a wrong key or a tampered file fails to decrypt
//!   rather than silently returning corrupt data.
//! - **Write-ahead logging** — every table rewrite is preceded by a WAL
//!   intent, replayed on [`engine::Engine::open`] after an unclean shutdown.
//! - **Buffered transactions** — operations accumulate against a
//!   transaction id and are applied atomically, in order, only at commit;
//!   rollback is pure in-memory discard.
//! - **Secondary indexes** — equality and compound indexes with optional
//!   uniqueness enforcement, used transparently by [`engine::Engine::query`]
//!   when a filter matches.
//! - **Filter/sort/paginate/join query engine** — a small boolean filter
//!   tree, stable single-column sort, offset-then-limit pagination, and
//!   foreign-key joins.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sealdb::crypto::Key;
//! use sealdb::engine::{Engine, EngineConfig, QuerySpec};
//! use serde_json::json;
//!
//! let key = Key::generate();
//! let engine = Engine::open("/tmp/my_db", Some(key), EngineConfig::default()).unwrap();
//!
//! engine.create_table("users", None).unwrap();
//! engine
//!     .add_data("users", json!({"name": "ada"}).as_object().unwrap().clone(), None)
//!     .unwrap();
//!
//! let rows = engine.query("users", &QuerySpec::default()).unwrap();
//! assert_eq!(rows.len(), 1);
//!
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod codec;
pub mod crypto;
pub mod engine;
pub mod index;
pub mod lock;
pub mod model;
pub mod query;
pub mod schema;
pub mod store;
pub mod txn;
pub mod wal;
