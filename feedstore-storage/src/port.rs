//! Persistence port traits and the persisted record shape.
//!
//! The store never touches durable bytes directly. It opens a handle per
//! operation, reads through [`PersistenceHandle::query_all`] and mutates
//! only inside [`PersistenceHandle::run_transaction`].
//!
//! # Transaction contract
//!
//! A transaction body either commits all of its writes or none of them.
//! When the body returns an error, or the commit itself fails, every
//! write attempted inside the body is rolled back. Readers never observe a
//! state in the middle of a body.

use std::sync::Arc;

use feedstore_core::{StoreResult, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// PERSISTED RECORDS
// ============================================================================

/// An image as the storage engine holds it.
///
/// Fields are plain strings so a corrupted or hand-edited store can hold
/// values the domain type would never accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFeedImage {
    pub id: String,
    pub image_description: Option<String>,
    pub location: Option<String>,
    pub url: String,
}

/// A cache snapshot as the storage engine holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCache {
    pub feed: Vec<StoredFeedImage>,
    pub timestamp: Timestamp,
}

// ============================================================================
// PORT TRAITS
// ============================================================================

/// Source of handles onto a storage engine.
///
/// `open_handle` may fail (misconfiguration, corruption, exhaustion). The
/// store does not retry; the error reaches the caller's completion.
pub trait PersistencePort: Send + Sync + 'static {
    type Handle: PersistenceHandle;

    /// Open a handle for a single operation.
    fn open_handle(&self) -> StoreResult<Self::Handle>;
}

/// A handle scoped to one store operation.
pub trait PersistenceHandle: Send {
    /// All persisted snapshots in storage order.
    fn query_all(&self) -> StoreResult<Vec<StoredCache>>;

    /// Run `body` in one all-or-nothing write transaction.
    fn run_transaction<F>(&self, body: F) -> StoreResult<()>
    where
        F: FnOnce(&mut dyn PersistenceTxn) -> StoreResult<()>;
}

/// Mutation primitives, available only inside a transaction body.
pub trait PersistenceTxn {
    /// Remove every persisted snapshot.
    fn delete_all(&mut self) -> StoreResult<()>;

    /// Append a snapshot.
    fn add(&mut self, cache: StoredCache) -> StoreResult<()>;
}

impl<P: PersistencePort> PersistencePort for Arc<P> {
    type Handle = P::Handle;

    fn open_handle(&self) -> StoreResult<Self::Handle> {
        (**self).open_handle()
    }
}
