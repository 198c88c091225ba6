//! Caching implementations for shop types.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::Cacheable;

use super::types::{Page, UserProfile};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for UserProfile {
  fn cache_key(&self) -> String {
    self.user_id.to_string()
  }

  fn entity_type() -> &'static str {
    "user_profile"
  }
}

impl<T> Cacheable for Page<T>
where
  T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
  fn cache_key(&self) -> String {
    format!("page:{}", self.pagination.page)
  }

  // List kinds are separated by `ListQueryKey`, which every caller supplies
  fn entity_type() -> &'static str {
    "page"
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Kinds of paged lists that are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
  Footprints,
  Conversations,
}

impl ListKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Footprints => "footprints",
      Self::Conversations => "conversations",
    }
  }
}

/// Cache key of the first page of a user's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQueryKey {
  pub kind: ListKind,
  pub user_id: i64,
  pub size: u32,
}

impl ListQueryKey {
  pub fn cache_hash(&self) -> String {
    let input = format!("{}:{}:{}", self.kind.as_str(), self.user_id, self.size);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}
