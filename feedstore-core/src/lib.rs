//! Feedstore Core - Domain Types and Contracts
//!
//! Pure data structures plus the store contract. Every other crate in the
//! workspace depends on this one; it performs no I/O of its own apart from
//! installing the tracing subscriber.

pub mod config;
pub mod error;
pub mod feed;
pub mod store;
pub mod telemetry;

pub use config::{MalformedRecordPolicy, StoreConfig};
pub use error::{ConfigError, StoreError, StoreResult};
pub use feed::{CachedFeed, LocalFeedImage, RetrievalOutcome, Timestamp};
pub use store::{DeletionCompletion, FeedStore, InsertionCompletion, RetrievalCompletion};
pub use telemetry::{init_tracing, TelemetryConfig};
