//! Write-ahead log
//!
//! A durable, append-only, encrypted log of intended mutations. Every
//! committed operation is appended here before the table file it targets is
//! rewritten, so a crash between the two leaves enough information on disk
//! to replay the operation on the next [`Wal::open`].
//!
//! ## On-disk layout
//!
//! ```text
//! <dir>/.salt                  -- 32 random bytes, PBKDF2 salt for the WAL key
//! <dir>/wal-<ms_timestamp>.log -- newline-delimited encrypted entries
//! ```
//!
//! Each line is `WAL:` followed by the hex `iv:tag:ciphertext` triple from
//! [`crate::crypto`]. The plaintext underneath is not the entry JSON
//! directly — it is padded to a configurable block size with random bytes
//! and a trailing 4-byte big-endian length prefix, so that entries of
//! different sizes don't leak their exact length through ciphertext length
//! alone.
//!
//! ## Concurrency model
//!
//! The active segment's file handle is shared via `Arc<Mutex<File>>`,
//! mirroring the teacher engine's WAL handle sharing, so a checkpoint task
//! and the appending writer never race on the same fd.

#[cfg(test)]
mod tests;

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::crypto::{self, CryptoError, Key};
use crate::model::Record;

const LINE_PREFIX: &str = "WAL:";
const SALT_FILE: &str = ".salt";
const LEN_PREFIX_SIZE: usize = 4;

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encryption/decryption failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// JSON encoding/decoding failure.
    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// An entry's stored checksum did not match its decoded operation.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A padded plaintext buffer's length prefix was out of range.
    #[error("malformed WAL entry framing")]
    Framing,

    /// WAL is disabled for this engine instance; the operation is a no-op.
    #[error("WAL is disabled")]
    Disabled,
}

/// One buffered mutation, as recorded in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Operation {
    CreateTable {
        table: String,
        schema: Option<serde_json::Value>,
    },
    DeleteTable {
        table: String,
    },
    Write {
        table: String,
        rows: Vec<Record>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalEntryOnDisk {
    sequence: u64,
    timestamp_ms: u64,
    operation: Operation,
    checksum: String,
}

/// One entry successfully recovered from the log, in replay order.
#[derive(Debug, Clone)]
pub struct RecoveredEntry {
    pub sequence: u64,
    pub operation: Operation,
}

/// A single failure encountered while replaying the log. Recovery does not
/// abort on these; they accumulate here for diagnostics.
#[derive(Debug, Clone)]
pub struct RecoveryFailure {
    pub file: PathBuf,
    pub entry_index: Option<usize>,
    pub error: String,
}

/// Outcome of replaying every segment found at [`Wal::open`].
#[derive(Debug, Clone, Default)]
pub struct RecoverySummary {
    pub entries_applied: usize,
    pub failures: Vec<RecoveryFailure>,
}

/// Tunables affecting append/checkpoint behavior. A subset of
/// [`crate::engine::EngineConfig`] relevant to the log.
#[derive(Debug, Clone)]
pub struct WalConfig {
    pub enabled: bool,
    pub sync_writes: bool,
    pub padding_size: usize,
    pub max_wal_size: u64,
    pub retention: Duration,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sync_writes: true,
            padding_size: 1024,
            max_wal_size: 64 * 1024 * 1024,
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

struct Segment {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

/// The write-ahead log for one engine instance.
pub struct Wal {
    dir: PathBuf,
    key: Option<Key>,
    config: WalConfig,
    current: Option<Segment>,
    next_sequence: AtomicU64,
}

impl Wal {
    /// Opens (creating if absent) the WAL directory at `dir`, replays every
    /// segment found there, and returns the handle alongside the ordered
    /// recovered operations and a summary of anything that failed to
    /// replay.
    ///
    /// `master_key` is required whenever `config.enabled` is true; the
    /// log's own key is derived from it via [`crypto::derive_wal_key`] so
    /// that compromising WAL ciphertext never yields the master key.
    pub fn open(
        dir: impl AsRef<Path>,
        master_key: Option<&Key>,
        config: WalConfig,
    ) -> Result<(Self, Vec<RecoveredEntry>, RecoverySummary), WalError> {
        let dir = dir.as_ref().to_path_buf();

        if !config.enabled {
            debug!(dir = %dir.display(), "WAL disabled, skipping recovery");
            return Ok((
                Self {
                    dir,
                    key: None,
                    config,
                    current: None,
                    next_sequence: AtomicU64::new(1),
                },
                Vec::new(),
                RecoverySummary::default(),
            ));
        }

        fs::create_dir_all(&dir)?;

        let salt_path = dir.join(SALT_FILE);
        let salt = load_or_create_salt(&salt_path)?;
        let master_key = master_key.expect("WAL enabled without a master key");
        let wal_key = crypto::derive_wal_key(master_key, &salt)?;

        let mut segments = list_segments(&dir)?;
        segments.sort();

        let mut recovered = Vec::new();
        let mut summary = RecoverySummary::default();
        let mut max_sequence = 0u64;

        for path in &segments {
            replay_segment(path, &wal_key, &mut recovered, &mut summary, &mut max_sequence);
        }

        // Every open starts a fresh segment; existing segments are replayed
        // but never appended to again, so a corrupt or unreadable entry in
        // an old segment can never block the new one from being created.
        let current_path = new_segment_path(&dir);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_path)?;

        debug!(
            entries = recovered.len(),
            failures = summary.failures.len(),
            segment = %current_path.display(),
            "WAL recovery complete"
        );

        Ok((
            Self {
                dir,
                key: Some(wal_key),
                config,
                current: Some(Segment {
                    path: current_path,
                    file: Arc::new(Mutex::new(file)),
                }),
                next_sequence: AtomicU64::new(max_sequence + 1),
            },
            recovered,
            summary,
        ))
    }

    /// Appends one operation to the active segment, flushing (and fsyncing,
    /// when `sync_writes` is set) before returning.
    pub fn append(&self, operation: Operation) -> Result<u64, WalError> {
        let Some(segment) = &self.current else {
            return Err(WalError::Disabled);
        };
        let key = self.key.as_ref().expect("enabled WAL always carries a key");

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp_ms = now_ms();
        let operation_json = serde_json::to_vec(&operation)?;
        let checksum = hex::encode(Sha256::digest(&operation_json));

        let entry = WalEntryOnDisk {
            sequence,
            timestamp_ms,
            operation,
            checksum,
        };
        let json = serde_json::to_vec(&entry)?;
        let padded = pad_plaintext(&json, self.config.padding_size);
        let encoded = crypto::encrypt(key, &padded)?;

        let mut file = segment.file.lock().expect("WAL file mutex poisoned");
        writeln!(file, "{LINE_PREFIX}{encoded}")?;
        if self.config.sync_writes {
            file.sync_all()?;
        }
        trace!(sequence, "appended WAL entry");

        Ok(sequence)
    }

    /// Current size, in bytes, of the active segment.
    pub fn current_size(&self) -> Result<u64, WalError> {
        let Some(segment) = &self.current else {
            return Ok(0);
        };
        let file = segment.file.lock().expect("WAL file mutex poisoned");
        Ok(file.metadata()?.len())
    }

    /// Starts a fresh segment if the active one exceeds `max_wal_size`.
    /// Returns whether rotation happened.
    pub fn maybe_rotate(&mut self) -> Result<bool, WalError> {
        if self.current.is_none() {
            return Ok(false);
        }
        if self.current_size()? < self.config.max_wal_size {
            return Ok(false);
        }
        self.rotate()?;
        Ok(true)
    }

    /// Unconditionally starts a fresh segment.
    pub fn rotate(&mut self) -> Result<(), WalError> {
        if self.current.is_none() {
            return Ok(());
        }
        let new_path = new_segment_path(&self.dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&new_path)?;
        debug!(segment = %new_path.display(), "rotated WAL segment");
        self.current = Some(Segment {
            path: new_path,
            file: Arc::new(Mutex::new(file)),
        });
        Ok(())
    }

    /// Deletes segments older than `retention` other than the active one.
    /// Returns the number of segments removed.
    pub fn checkpoint(&self) -> Result<usize, WalError> {
        if self.current.is_none() {
            return Ok(0);
        }
        let active_path = self.current.as_ref().map(|s| s.path.clone());
        let mut removed = 0;
        for path in list_segments(&self.dir)? {
            if Some(&path) == active_path.as_ref() {
                continue;
            }
            let age = fs::metadata(&path)?
                .modified()?
                .elapsed()
                .unwrap_or(Duration::ZERO);
            if age >= self.config.retention {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "WAL checkpoint reclaimed old segments");
        }
        Ok(removed)
    }

    pub fn is_enabled(&self) -> bool {
        self.current.is_some()
    }

    /// Takes ownership of the derived WAL key, leaving the log unable to
    /// append or replay further. Used by [`crate::engine::Engine::close`] to
    /// zeroize the key deterministically rather than waiting on `Drop`.
    pub fn take_key(&mut self) -> Option<Key> {
        self.key.take()
    }
}

fn replay_segment(
    path: &Path,
    key: &Key,
    recovered: &mut Vec<RecoveredEntry>,
    summary: &mut RecoverySummary,
    max_sequence: &mut u64,
) {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            summary.failures.push(RecoveryFailure {
                file: path.to_path_buf(),
                entry_index: None,
                error: e.to_string(),
            });
            return;
        }
    };

    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                summary.failures.push(RecoveryFailure {
                    file: path.to_path_buf(),
                    entry_index: Some(index),
                    error: e.to_string(),
                });
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match decode_line(&line, key) {
            Ok(entry) => {
                *max_sequence = (*max_sequence).max(entry.sequence);
                summary.entries_applied += 1;
                recovered.push(RecoveredEntry {
                    sequence: entry.sequence,
                    operation: entry.operation,
                });
            }
            Err(e) => {
                warn!(file = %path.display(), index, error = %e, "failed to replay WAL entry");
                summary.failures.push(RecoveryFailure {
                    file: path.to_path_buf(),
                    entry_index: Some(index),
                    error: e.to_string(),
                });
            }
        }
    }
}

fn decode_line(line: &str, key: &Key) -> Result<WalEntryOnDisk, WalError> {
    let encoded = line.strip_prefix(LINE_PREFIX).ok_or(WalError::Framing)?;
    let padded = crypto::decrypt(key, encoded)?;
    let json = unpad_plaintext(&padded)?;
    let entry: WalEntryOnDisk = serde_json::from_slice(&json)?;
    let operation_json = serde_json::to_vec(&entry.operation)?;
    let expected = hex::encode(Sha256::digest(&operation_json));
    if expected != entry.checksum {
        return Err(WalError::ChecksumMismatch);
    }
    Ok(entry)
}

fn pad_plaintext(json: &[u8], block: usize) -> Vec<u8> {
    let block = block.max(LEN_PREFIX_SIZE + 1);
    let min_len = json.len() + LEN_PREFIX_SIZE;
    let padded_len = min_len.div_ceil(block) * block;

    let mut buf = vec![0u8; padded_len];
    buf[..json.len()].copy_from_slice(json);
    let pad_region = &mut buf[json.len()..padded_len - LEN_PREFIX_SIZE];
    rand::rng().fill_bytes(pad_region);
    let len_bytes = (json.len() as u32).to_be_bytes();
    buf[padded_len - LEN_PREFIX_SIZE..].copy_from_slice(&len_bytes);
    buf
}

fn unpad_plaintext(buf: &[u8]) -> Result<Vec<u8>, WalError> {
    if buf.len() < LEN_PREFIX_SIZE {
        return Err(WalError::Framing);
    }
    let (rest, len_bytes) = buf.split_at(buf.len() - LEN_PREFIX_SIZE);
    let len = u32::from_be_bytes(len_bytes.try_into().expect("4 bytes")) as usize;
    if len > rest.len() {
        return Err(WalError::Framing);
    }
    Ok(rest[..len].to_vec())
}

fn load_or_create_salt(path: &Path) -> Result<[u8; 32], WalError> {
    match fs::read(path) {
        Ok(bytes) if bytes.len() == 32 => {
            let mut salt = [0u8; 32];
            salt.copy_from_slice(&bytes);
            Ok(salt)
        }
        Ok(_) | Err(_) => {
            let salt = crypto::generate_salt();
            fs::write(path, salt)?;
            Ok(salt)
        }
    }
}

fn list_segments(dir: &Path) -> Result<Vec<PathBuf>, WalError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("log") {
            out.push(path);
        }
    }
    Ok(out)
}

fn new_segment_path(dir: &Path) -> PathBuf {
    dir.join(format!("wal-{}.log", now_ms()))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}
