//! Conversion between domain feed images and persisted records.
//!
//! Domain to persisted is total. Persisted to domain is partial: the stored
//! id must parse as a UUID and the stored url as an absolute URL.

use feedstore_core::{
    CachedFeed, LocalFeedImage, MalformedRecordPolicy, StoreError, StoreResult,
};
use url::Url;
use uuid::Uuid;

use crate::port::{StoredCache, StoredFeedImage};

/// Persist an id in upper-case hyphenated form.
fn encode_id(id: Uuid) -> String {
    id.hyphenated()
        .encode_upper(&mut Uuid::encode_buffer())
        .to_string()
}

pub fn to_stored_image(image: &LocalFeedImage) -> StoredFeedImage {
    StoredFeedImage {
        id: encode_id(image.id),
        image_description: image.description.clone(),
        location: image.location.clone(),
        url: image.url.as_str().to_string(),
    }
}

pub fn to_stored_feed(feed: &[LocalFeedImage]) -> Vec<StoredFeedImage> {
    feed.iter().map(to_stored_image).collect()
}

pub fn to_stored_cache(cache: &CachedFeed) -> StoredCache {
    StoredCache {
        feed: to_stored_feed(&cache.feed),
        timestamp: cache.timestamp,
    }
}

/// Map one persisted image back, failing on a malformed id or url.
pub fn to_local_image(stored: &StoredFeedImage) -> StoreResult<LocalFeedImage> {
    let id = Uuid::parse_str(&stored.id)
        .map_err(|e| StoreError::mapping("id", stored.id.as_str(), e.to_string()))?;
    let url = Url::parse(&stored.url)
        .map_err(|e| StoreError::mapping("url", stored.url.as_str(), e.to_string()))?;

    Ok(LocalFeedImage {
        id,
        description: stored.image_description.clone(),
        location: stored.location.clone(),
        url,
    })
}

/// Map a persisted feed back, keeping stored order.
pub fn to_local_feed(
    stored: &[StoredFeedImage],
    policy: MalformedRecordPolicy,
) -> StoreResult<Vec<LocalFeedImage>> {
    match policy {
        MalformedRecordPolicy::Reject => stored.iter().map(to_local_image).collect(),
        MalformedRecordPolicy::Skip => Ok(stored
            .iter()
            .filter_map(|record| match to_local_image(record) {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed cached feed image");
                    None
                }
            })
            .collect()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
