//! Process-local persistence port.
//!
//! Clones share storage, so a test can open a second store over the same
//! data. Transactions stage their writes on a copy that replaces the live
//! state only when the body succeeds.

use std::sync::{Arc, Mutex, MutexGuard};

use feedstore_core::{StoreError, StoreResult};

use crate::port::{PersistenceHandle, PersistencePort, PersistenceTxn, StoredCache};

#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    caches: Arc<Mutex<Vec<StoredCache>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted snapshots.
    pub fn len(&self) -> usize {
        self.lock().map(|caches| caches.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Vec<StoredCache>>> {
        self.caches
            .lock()
            .map_err(|_| StoreError::handle("in-memory storage lock poisoned"))
    }
}

impl PersistencePort for InMemoryPersistence {
    type Handle = InMemoryHandle;

    fn open_handle(&self) -> StoreResult<Self::Handle> {
        Ok(InMemoryHandle {
            storage: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct InMemoryHandle {
    storage: InMemoryPersistence,
}

impl PersistenceHandle for InMemoryHandle {
    fn query_all(&self) -> StoreResult<Vec<StoredCache>> {
        Ok(self.storage.lock()?.clone())
    }

    fn run_transaction<F>(&self, body: F) -> StoreResult<()>
    where
        F: FnOnce(&mut dyn PersistenceTxn) -> StoreResult<()>,
    {
        let mut live = self.storage.lock()?;
        let mut staged = StagedCaches {
            caches: live.clone(),
        };
        body(&mut staged as &mut dyn PersistenceTxn)?;
        *live = staged.caches;
        Ok(())
    }
}

struct StagedCaches {
    caches: Vec<StoredCache>,
}

impl PersistenceTxn for StagedCaches {
    fn delete_all(&mut self) -> StoreResult<()> {
        self.caches.clear();
        Ok(())
    }

    fn add(&mut self, cache: StoredCache) -> StoreResult<()> {
        self.caches.push(cache);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cache() -> StoredCache {
        StoredCache {
            feed: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_commit_replaces_live_state() {
        let storage = InMemoryPersistence::new();
        let handle = storage.open_handle().unwrap();

        handle
            .run_transaction(|txn| {
                txn.delete_all()?;
                txn.add(cache())
            })
            .unwrap();

        assert_eq!(storage.len(), 1);
        assert_eq!(handle.query_all().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_body_rolls_back() {
        let storage = InMemoryPersistence::new();
        let handle = storage.open_handle().unwrap();
        handle.run_transaction(|txn| txn.add(cache())).unwrap();

        let result = handle.run_transaction(|txn| {
            txn.delete_all()?;
            Err(StoreError::transaction("boom"))
        });

        assert!(result.unwrap_err().is_transaction());
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_clones_share_storage() {
        let storage = InMemoryPersistence::new();
        let other = storage.clone();
        storage
            .open_handle()
            .unwrap()
            .run_transaction(|txn| txn.add(cache()))
            .unwrap();
        assert!(!other.is_empty());
    }
}
