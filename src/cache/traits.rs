//! Core traits and types for the entity cache.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Trait for values that can be stored in the local cache.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Key used when the caller did not resolve one (usually the subject id)
  fn cache_key(&self) -> String;

  /// Entity type name for storage organization (e.g., "profile", "page")
  fn entity_type() -> &'static str;
}

/// A keyed, timestamped local copy of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity<T> {
  pub key: String,
  pub value: T,
  /// When the entry was last written
  pub last_updated: DateTime<Utc>,
}

impl<T> CachedEntity<T> {
  pub fn age(&self) -> Duration {
    Utc::now() - self.last_updated
  }
}
