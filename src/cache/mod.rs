//! Generic offline-first cache for data persistence.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Stores keyed, timestamped copies of values in a local store
//! - Serves cached values first, then reconciles with the network
//! - Prefers stale data over an error once something has been shown

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{LocalStore, MemoryStorage, SqliteStorage};
pub use traits::{CachedEntity, Cacheable};
