//! Feedstore Storage - Persistence Port, Sequencer and Store Façade
//!
//! Turns any [`PersistencePort`] into a [`FeedStore`](feedstore_core::FeedStore)
//! whose retrievals run in parallel with each other while every insertion
//! and deletion runs alone.
//!
//! Two ports ship with the crate:
//! - [`LmdbPersistence`]: durable, file-backed, built on heed
//! - [`InMemoryPersistence`]: process-local, for tests and ephemeral use

pub mod backends;
pub mod completion;
pub mod local_store;
pub mod mapper;
pub mod port;
pub mod sequencer;

pub use backends::{InMemoryPersistence, LmdbPersistence};
pub use completion::Completion;
pub use local_store::LocalFeedStore;
pub use port::{PersistenceHandle, PersistencePort, PersistenceTxn, StoredCache, StoredFeedImage};
pub use sequencer::{AccessClass, CacheSequencer};
