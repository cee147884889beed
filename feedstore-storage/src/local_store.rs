//! The feed store façade.
//!
//! [`LocalFeedStore`] assembles the persistence port, the record mapper and
//! the sequencer into the three store operations. Each operation comes in
//! two forms:
//!
//! - callback: `retrieve_with`, `insert_with`, `delete_cached_feed_with`,
//!   returning immediately and invoking the completion exactly once
//! - async: the [`FeedStore`] impl, built on the callback form
//!
//! Retrievals take shared access; insertions and deletions take exclusive
//! access. Every operation opens a fresh handle inside its access window
//! and drops it before releasing access.

use std::sync::Arc;

use async_trait::async_trait;
use feedstore_core::{
    CachedFeed, FeedStore, LocalFeedImage, MalformedRecordPolicy, RetrievalOutcome,
    StoreConfig, StoreError, StoreResult, Timestamp,
};
use tokio::sync::oneshot;

use crate::backends::LmdbPersistence;
use crate::completion::Completion;
use crate::mapper;
use crate::port::{PersistenceHandle, PersistencePort};
use crate::sequencer::CacheSequencer;

/// Feed store over an arbitrary persistence port.
///
/// Clones share the port and the sequencer, so operations issued through
/// any clone are ordered against each other.
pub struct LocalFeedStore<P: PersistencePort> {
    port: Arc<P>,
    sequencer: CacheSequencer,
    policy: MalformedRecordPolicy,
}

impl<P: PersistencePort> Clone for LocalFeedStore<P> {
    fn clone(&self) -> Self {
        Self {
            port: Arc::clone(&self.port),
            sequencer: self.sequencer.clone(),
            policy: self.policy,
        }
    }
}

impl LocalFeedStore<LmdbPersistence> {
    /// Open a file-backed store described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when called outside a tokio runtime. Storage problems are not
    /// detected here; they surface on the first operation.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Self::with_policy(
            LmdbPersistence::from_config(config),
            config.malformed_record_policy,
        )
    }
}

impl<P: PersistencePort> LocalFeedStore<P> {
    /// Create a store that rejects malformed records.
    pub fn new(port: P) -> StoreResult<Self> {
        Self::with_policy(port, MalformedRecordPolicy::default())
    }

    pub fn with_policy(port: P, policy: MalformedRecordPolicy) -> StoreResult<Self> {
        Ok(Self {
            port: Arc::new(port),
            sequencer: CacheSequencer::new()?,
            policy,
        })
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn policy(&self) -> MalformedRecordPolicy {
        self.policy
    }

    /// Deliver the cached feed to `completion`.
    pub fn retrieve_with<F>(&self, completion: F)
    where
        F: FnOnce(StoreResult<RetrievalOutcome>) + Send + 'static,
    {
        let completion = Completion::new("retrieve", completion);
        let port = Arc::clone(&self.port);
        let policy = self.policy;

        self.sequencer.schedule_read(move || {
            completion.complete(retrieve_cache(port.as_ref(), policy));
        });
    }

    /// Replace the cached feed, then notify `completion`.
    pub fn insert_with<F>(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp, completion: F)
    where
        F: FnOnce(StoreResult<()>) + Send + 'static,
    {
        let completion = Completion::new("insert", completion);
        let port = Arc::clone(&self.port);

        self.sequencer.schedule_write(move || {
            let cache = mapper::to_stored_cache(&CachedFeed::new(feed, timestamp));
            tracing::debug!(images = cache.feed.len(), "Inserting cached feed");
            completion.complete(replace_cache(port.as_ref(), cache));
        });
    }

    /// Remove the cached feed, then notify `completion`.
    pub fn delete_cached_feed_with<F>(&self, completion: F)
    where
        F: FnOnce(StoreResult<()>) + Send + 'static,
    {
        let completion = Completion::new("delete_cached_feed", completion);
        let port = Arc::clone(&self.port);

        self.sequencer.schedule_write(move || {
            completion.complete(delete_cache(port.as_ref()));
        });
    }
}

fn retrieve_cache<P: PersistencePort>(
    port: &P,
    policy: MalformedRecordPolicy,
) -> StoreResult<RetrievalOutcome> {
    let handle = port.open_handle()?;
    let Some(cache) = handle.query_all()?.into_iter().next() else {
        return Ok(RetrievalOutcome::Empty);
    };

    let feed = mapper::to_local_feed(&cache.feed, policy)?;
    Ok(RetrievalOutcome::Found {
        feed,
        timestamp: cache.timestamp,
    })
}

fn replace_cache<P: PersistencePort>(port: &P, cache: crate::port::StoredCache) -> StoreResult<()> {
    let handle = port.open_handle()?;
    handle.run_transaction(move |txn| {
        txn.delete_all()?;
        txn.add(cache)
    })
}

fn delete_cache<P: PersistencePort>(port: &P) -> StoreResult<()> {
    let handle = port.open_handle()?;
    handle.run_transaction(|txn| txn.delete_all())
}

/// Wait for a completion delivered through a oneshot channel.
async fn await_completion<T>(rx: oneshot::Receiver<StoreResult<T>>) -> StoreResult<T> {
    rx.await
        .map_err(|_| StoreError::worker("completion channel closed"))?
}

#[async_trait]
impl<P: PersistencePort> FeedStore for LocalFeedStore<P> {
    async fn retrieve(&self) -> StoreResult<RetrievalOutcome> {
        let (tx, rx) = oneshot::channel();
        self.retrieve_with(move |result| {
            let _ = tx.send(result);
        });
        await_completion(rx).await
    }

    async fn insert(&self, feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> StoreResult<()> {
        let (tx, rx) = oneshot::channel();
        self.insert_with(feed, timestamp, move |result| {
            let _ = tx.send(result);
        });
        await_completion(rx).await
    }

    async fn delete_cached_feed(&self) -> StoreResult<()> {
        let (tx, rx) = oneshot::channel();
        self.delete_cached_feed_with(move |result| {
            let _ = tx.send(result);
        });
        await_completion(rx).await
    }
}

// =============================================================================
// TESTS
// =============================================================================
