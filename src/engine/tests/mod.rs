mod tests_basic;

use std::time::Duration;

use tempfile::TempDir;

use crate::crypto::Key;
use crate::engine::{Engine, EngineConfig};

/// Builds a fresh engine rooted at a temp directory with a generated master
/// key and the checkpoint scheduler disabled, so tests don't race a
/// background thread.
pub fn open_test_engine() -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        checkpoint_interval: Duration::ZERO,
        lock_timeout: Duration::from_millis(500),
        ..EngineConfig::default()
    };
    let engine = Engine::open(dir.path(), Some(Key::generate()), config).unwrap();
    (dir, engine)
}
