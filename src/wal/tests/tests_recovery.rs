use std::time::Duration;

use tempfile::tempdir;

use crate::crypto::Key;
use crate::wal::{Operation, Wal, WalConfig};

#[test]
fn checkpoint_never_removes_the_active_segment() {
    let dir = tempdir().unwrap();
    let key = Key::generate();
    let config = WalConfig {
        retention: Duration::from_secs(0),
        ..WalConfig::default()
    };
    let (wal, _, _) = Wal::open(dir.path(), Some(&key), config).unwrap();
    wal.append(Operation::DeleteTable { table: "t".into() })
        .unwrap();

    let removed = wal.checkpoint().unwrap();
    assert_eq!(removed, 0);
    assert!(wal.is_enabled());
}

#[test]
fn checkpoint_reclaims_retired_segments() {
    let dir = tempdir().unwrap();
    let key = Key::generate();
    let config = WalConfig {
        retention: Duration::from_secs(0),
        ..WalConfig::default()
    };
    let (mut wal, _, _) = Wal::open(dir.path(), Some(&key), config).unwrap();
    wal.append(Operation::DeleteTable { table: "t".into() })
        .unwrap();
    wal.rotate().unwrap();

    let removed = wal.checkpoint().unwrap();
    assert_eq!(removed, 1);
}

#[test]
fn recovery_summary_tracks_unreadable_segment_files() {
    let dir = tempdir().unwrap();
    let key = Key::generate();
    // A directory entry with a .log extension that isn't a regular file's
    // content (a sub-directory) should surface as a recovery failure, not a
    // panic.
    std::fs::create_dir_all(dir.path().join("oops.log")).unwrap();

    let (_wal, recovered, summary) = Wal::open(dir.path(), Some(&key), WalConfig::default()).unwrap();
    assert!(recovered.is_empty());
    assert_eq!(summary.failures.len(), 1);
}
