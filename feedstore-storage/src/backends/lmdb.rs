//! LMDB-backed persistence port.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a durable,
//! memory-mapped store with ACID transactions.
//!
//! # Layout
//!
//! One unnamed database. Keys are big-endian `u64` insertion sequence
//! numbers, so iteration order is insertion order. Values are the JSON
//! encoding of [`StoredCache`].
//!
//! # Handles
//!
//! The environment is opened on the first [`PersistencePort::open_handle`]
//! and shared by every later handle. A failed open is reported as
//! [`StoreError::Handle`] and attempted again on the next call.

use std::path::{Path, PathBuf};

use feedstore_core::config::map_size_bytes;
use feedstore_core::{StoreConfig, StoreError, StoreResult};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use once_cell::sync::OnceCell;

use crate::port::{PersistenceHandle, PersistencePort, PersistenceTxn, StoredCache};

#[derive(Clone)]
struct OpenedEnv {
    env: Env,
    db: Database<Bytes, Bytes>,
}

/// File-backed persistence port.
pub struct LmdbPersistence {
    path: PathBuf,
    map_size_mb: usize,
    opened: OnceCell<OpenedEnv>,
}

impl LmdbPersistence {
    /// Create a port for the LMDB environment in directory `path`.
    ///
    /// Nothing is opened until the first handle is requested.
    pub fn new<P: AsRef<Path>>(path: P, map_size_mb: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            map_size_mb,
            opened: OnceCell::new(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.path, config.map_size_mb)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_env(&self) -> StoreResult<OpenedEnv> {
        let map_size = map_size_bytes(self.map_size_mb).ok_or_else(|| {
            StoreError::handle(format!("map size of {} MB overflows", self.map_size_mb))
        })?;

        std::fs::create_dir_all(&self.path).map_err(|e| {
            StoreError::handle(format!("cannot create {}: {}", self.path.display(), e))
        })?;

        // SAFETY: the environment is opened once per port and never resized
        // or reopened with different flags while handles are alive.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(&self.path)
        }
        .map_err(|e| StoreError::handle(format!("failed to open LMDB environment: {e}")))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::handle(format!("failed to begin setup transaction: {e}")))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| StoreError::handle(format!("failed to open database: {e}")))?;
        wtxn.commit()
            .map_err(|e| StoreError::handle(format!("failed to commit setup transaction: {e}")))?;

        tracing::debug!(path = %self.path.display(), map_size_mb = self.map_size_mb, "Opened LMDB environment");
        Ok(OpenedEnv { env, db })
    }
}

impl std::fmt::Debug for LmdbPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbPersistence")
            .field("path", &self.path)
            .field("map_size_mb", &self.map_size_mb)
            .field("opened", &self.opened.get().is_some())
            .finish()
    }
}

impl PersistencePort for LmdbPersistence {
    type Handle = LmdbHandle;

    fn open_handle(&self) -> StoreResult<Self::Handle> {
        let opened = self.opened.get_or_try_init(|| self.open_env())?;
        Ok(LmdbHandle {
            env: opened.env.clone(),
            db: opened.db,
        })
    }
}

/// Handle onto an opened LMDB environment.
pub struct LmdbHandle {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl PersistenceHandle for LmdbHandle {
    fn query_all(&self) -> StoreResult<Vec<StoredCache>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| StoreError::transaction(format!("failed to begin read: {e}")))?;
        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| StoreError::transaction(format!("failed to iterate: {e}")))?;

        let mut caches = Vec::new();
        for entry in iter {
            let (_, bytes) =
                entry.map_err(|e| StoreError::transaction(format!("failed to read entry: {e}")))?;
            let cache: StoredCache = serde_json::from_slice(bytes).map_err(|e| {
                StoreError::mapping("cache", format!("{} bytes", bytes.len()), e.to_string())
            })?;
            caches.push(cache);
        }
        Ok(caches)
    }

    fn run_transaction<F>(&self, body: F) -> StoreResult<()>
    where
        F: FnOnce(&mut dyn PersistenceTxn) -> StoreResult<()>,
    {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| StoreError::transaction(format!("failed to begin write: {e}")))?;

        // An early return drops `wtxn`, which aborts it.
        body(&mut LmdbTxn {
            wtxn: &mut wtxn,
            db: self.db,
        })?;

        wtxn.commit()
            .map_err(|e| StoreError::transaction(format!("failed to commit: {e}")))
    }
}

struct LmdbTxn<'a, 'p> {
    wtxn: &'a mut RwTxn<'p>,
    db: Database<Bytes, Bytes>,
}

impl LmdbTxn<'_, '_> {
    fn next_key(&self) -> StoreResult<u64> {
        let last = self
            .db
            .last(&*self.wtxn)
            .map_err(|e| StoreError::transaction(format!("failed to read last key: {e}")))?;
        match last {
            None => Ok(0),
            Some((key, _)) => {
                let seq = <[u8; 8]>::try_from(key).map(u64::from_be_bytes).map_err(|_| {
                    StoreError::mapping("key", format!("{key:?}"), "expected 8-byte sequence number")
                })?;
                Ok(seq + 1)
            }
        }
    }
}

impl PersistenceTxn for LmdbTxn<'_, '_> {
    fn delete_all(&mut self) -> StoreResult<()> {
        self.db
            .clear(&mut *self.wtxn)
            .map_err(|e| StoreError::transaction(format!("failed to clear: {e}")))
    }

    fn add(&mut self, cache: StoredCache) -> StoreResult<()> {
        let key = self.next_key()?.to_be_bytes();
        let value = serde_json::to_vec(&cache)
            .map_err(|e| StoreError::transaction(format!("failed to encode cache: {e}")))?;
        self.db
            .put(&mut *self.wtxn, &key, &value)
            .map_err(|e| StoreError::transaction(format!("failed to write cache: {e}")))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::StoredFeedImage;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_port() -> (LmdbPersistence, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let port = LmdbPersistence::new(temp_dir.path(), 10);
        (port, temp_dir)
    }

    fn cache(description: &str) -> StoredCache {
        StoredCache {
            feed: vec![StoredFeedImage {
                id: "6A1C5E0E-0000-7000-8000-000000000000".to_string(),
                image_description: Some(description.to_string()),
                location: None,
                url: "https://a-url.com/".to_string(),
            }],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_environment_has_no_caches() {
        let (port, _temp_dir) = create_test_port();
        let handle = port.open_handle().expect("handle should open");
        assert!(handle.query_all().expect("query should succeed").is_empty());
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let (port, _temp_dir) = create_test_port();
        let handle = port.open_handle().expect("handle should open");

        handle
            .run_transaction(|txn| {
                txn.add(cache("first"))?;
                txn.add(cache("second"))
            })
            .expect("transaction should commit");
        handle
            .run_transaction(|txn| txn.add(cache("third")))
            .expect("transaction should commit");

        let descriptions: Vec<_> = handle
            .query_all()
            .expect("query should succeed")
            .into_iter()
            .map(|c| c.feed[0].image_description.clone().unwrap_or_default())
            .collect();
        assert_eq!(descriptions, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_delete_all_then_add_replaces() {
        let (port, _temp_dir) = create_test_port();
        let handle = port.open_handle().expect("handle should open");
        handle.run_transaction(|txn| txn.add(cache("old"))).unwrap();

        let replacement = cache("new");
        let expected = replacement.clone();
        handle
            .run_transaction(move |txn| {
                txn.delete_all()?;
                txn.add(replacement)
            })
            .unwrap();

        assert_eq!(handle.query_all().unwrap(), vec![expected]);
    }

    #[test]
    fn test_failed_body_aborts() {
        let (port, _temp_dir) = create_test_port();
        let handle = port.open_handle().expect("handle should open");
        let original = cache("keep me");
        let expected = original.clone();
        handle.run_transaction(move |txn| txn.add(original)).unwrap();

        let result = handle.run_transaction(|txn| {
            txn.delete_all()?;
            txn.add(cache("never visible"))?;
            Err(StoreError::transaction("injected"))
        });

        assert!(result.unwrap_err().is_transaction());
        assert_eq!(handle.query_all().unwrap(), vec![expected]);
    }

    #[test]
    fn test_unusable_path_is_handle_error() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let file_path = temp_dir.path().join("not-a-directory");
        std::fs::write(&file_path, b"occupied").expect("write should succeed");

        let port = LmdbPersistence::new(&file_path, 10);
        let err = port.open_handle().err().expect("open should fail");
        assert!(err.is_handle());
    }

    #[test]
    fn test_overflowing_map_size_is_handle_error() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store_path = temp_dir.path().join("store");
        let port = LmdbPersistence::new(&store_path, usize::MAX);

        let err = port.open_handle().err().expect("open should fail");
        assert!(err.is_handle(), "unexpected error: {err}");
        assert_eq!(port.path(), store_path.as_path());
        assert!(!port.path().exists(), "nothing should be created on disk");
    }

    #[test]
    fn test_corrupted_value_is_mapping_error() {
        let (port, _temp_dir) = create_test_port();
        let opened = port.open_handle().expect("handle should open");

        let mut wtxn = opened.env.write_txn().unwrap();
        opened
            .db
            .put(&mut wtxn, &0u64.to_be_bytes(), b"{not json")
            .unwrap();
        wtxn.commit().unwrap();

        let err = opened.query_all().unwrap_err();
        assert!(matches!(err, StoreError::Mapping { ref field, .. } if field == "cache"));
    }
}
