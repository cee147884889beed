//! The feed store contract.

use crate::error::StoreResult;
use crate::feed::{LocalFeedImage, RetrievalOutcome, Timestamp};
use async_trait::async_trait;

/// Single-shot callback receiving a retrieval result.
pub type RetrievalCompletion = Box<dyn FnOnce(StoreResult<RetrievalOutcome>) + Send + 'static>;

/// Single-shot callback receiving an insertion result.
pub type InsertionCompletion = Box<dyn FnOnce(StoreResult<()>) + Send + 'static>;

/// Single-shot callback receiving a deletion result.
pub type DeletionCompletion = Box<dyn FnOnce(StoreResult<()>) + Send + 'static>;

/// A durable store holding at most one cached feed.
///
/// Implementations must behave as if operations issued by one caller ran
/// one at a time in issuance order. Retrievals may overlap each other;
/// insertions and deletions never overlap anything.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Read the cached feed, if any. Never mutates the store.
    async fn retrieve(&self) -> StoreResult<RetrievalOutcome>;

    /// Replace whatever is cached with `feed` and `timestamp`.
    async fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreResult<()>;

    /// Remove the cached feed. Succeeds on an empty store.
    async fn delete_cached_feed(&self) -> StoreResult<()>;
}
