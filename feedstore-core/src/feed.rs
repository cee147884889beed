//! Feed and cache snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// FEED IMAGE
// ============================================================================

/// A single image reference inside a feed.
///
/// Identity is `id`, but equality is field-wise: two images with the same
/// id and a different description are different values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFeedImage {
    pub id: Uuid,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Url,
}

impl LocalFeedImage {
    pub fn new(
        id: Uuid,
        description: Option<String>,
        location: Option<String>,
        url: Url,
    ) -> Self {
        Self {
            id,
            description,
            location,
            url,
        }
    }
}

// ============================================================================
// CACHE SNAPSHOT
// ============================================================================

/// The single `(feed, timestamp)` pair held by a store.
///
/// `feed` keeps the order supplied by the caller on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFeed {
    pub feed: Vec<LocalFeedImage>,
    pub timestamp: Timestamp,
}

impl CachedFeed {
    pub fn new(feed: Vec<LocalFeedImage>, timestamp: Timestamp) -> Self {
        Self { feed, timestamp }
    }
}

/// Successful result of a retrieval.
///
/// Failures travel in the surrounding [`StoreResult`](crate::StoreResult),
/// so a retrieval completion sees one of `Ok(Empty)`, `Ok(Found { .. })`
/// or `Err(error)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// No snapshot is present.
    Empty,
    /// The stored snapshot.
    Found {
        feed: Vec<LocalFeedImage>,
        timestamp: Timestamp,
    },
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, RetrievalOutcome::Empty)
    }

    /// Convert into the snapshot, if one was found.
    pub fn into_cached_feed(self) -> Option<CachedFeed> {
        match self {
            RetrievalOutcome::Empty => None,
            RetrievalOutcome::Found { feed, timestamp } => Some(CachedFeed { feed, timestamp }),
        }
    }
}

impl From<Option<CachedFeed>> for RetrievalOutcome {
    fn from(cache: Option<CachedFeed>) -> Self {
        match cache {
            None => RetrievalOutcome::Empty,
            Some(CachedFeed { feed, timestamp }) => RetrievalOutcome::Found { feed, timestamp },
        }
    }
}

impl From<CachedFeed> for RetrievalOutcome {
    fn from(cache: CachedFeed) -> Self {
        Some(cache).into()
    }
}

// =============================================================================
// TESTS
// =============================================================================
