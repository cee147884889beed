#![allow(dead_code)]

use feedstore_storage::{InMemoryPersistence, LmdbPersistence};
use tempfile::TempDir;

pub const TEST_MAP_SIZE_MB: usize = 10;

/// The guard keeps an LMDB directory alive for the length of a test.
pub type DirGuard = Option<TempDir>;

pub fn memory_port() -> (InMemoryPersistence, DirGuard) {
    (InMemoryPersistence::new(), None)
}

pub fn lmdb_port() -> (LmdbPersistence, DirGuard) {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let port = LmdbPersistence::new(dir.path(), TEST_MAP_SIZE_MB);
    (port, Some(dir))
}
