//! Backing store implementations.
//!
//! [`KvStore`] is the contract the repository layer consumes.
//! [`RedisBackend`] is the production implementation; [`InMemoryBackend`]
//! backs unit tests, property tests, and the examples.

pub mod memory;
pub mod redis;
pub mod traits;

pub use memory::InMemoryBackend;
pub use redis::RedisBackend;
pub use traits::{KvStore, StoreError};
