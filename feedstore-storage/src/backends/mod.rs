//! Persistence port implementations.

pub mod lmdb;
pub mod memory;

pub use lmdb::LmdbPersistence;
pub use memory::InMemoryPersistence;
