//! Cache layer that reconciles the local store with network fetches.

use futures::stream::{self, Stream};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::LocalStore;
use super::traits::{CachedEntity, Cacheable};
use crate::error::{SyncError, SyncResult};
use crate::resource::Resource;

/// Cache layer that manages offline-first reads and cache writes.
///
/// Store calls run on the blocking pool. Once a write has been handed to the
/// pool it runs to completion even if the caller's future is dropped.
pub struct CacheLayer<S: LocalStore> {
  storage: Arc<S>,
}

enum ReadStep<F> {
  Cache { key: Option<String>, fetch: F },
  Network { key: Option<String>, fetch: F },
  Done,
}

impl<S: LocalStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Look up a cached entry.
  pub async fn cached<T: Cacheable>(&self, key: &str) -> SyncResult<Option<CachedEntity<T>>> {
    let storage = Arc::clone(&self.storage);
    let key = key.to_string();
    tokio::task::spawn_blocking(move || storage.get::<T>(&key))
      .await
      .map_err(|e| SyncError::storage("Cache task failed", e))?
  }

  /// The oldest cached entry of type `T`.
  pub async fn first_record<T: Cacheable>(&self) -> SyncResult<Option<CachedEntity<T>>> {
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || storage.first_record::<T>())
      .await
      .map_err(|e| SyncError::storage("Cache task failed", e))?
  }

  /// Upsert an entry by key.
  pub async fn store<T: Cacheable>(&self, key: String, value: T) -> SyncResult<()> {
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || storage.upsert(&key, &value))
      .await
      .map_err(|e| SyncError::storage("Cache task failed", e))?
  }

  /// Remove an entry by key.
  pub async fn evict<T: Cacheable>(&self, key: &str) -> SyncResult<()> {
    let storage = Arc::clone(&self.storage);
    let key = key.to_string();
    tokio::task::spawn_blocking(move || storage.delete::<T>(&key))
      .await
      .map_err(|e| SyncError::storage("Cache task failed", e))?
  }

  /// Remove every cached entry (logout).
  pub async fn purge(&self) -> SyncResult<()> {
    let storage = Arc::clone(&self.storage);
    tokio::task::spawn_blocking(move || storage.purge())
      .await
      .map_err(|e| SyncError::storage("Cache task failed", e))?
  }

  /// Offline-first read.
  ///
  /// 1. If `key` is resolved and cached, emit the cached value immediately
  /// 2. Fetch from the network
  /// 3. On success, upsert the fresh value and emit it
  /// 4. On failure, emit the error only if nothing was emitted before
  ///
  /// Fresh values are stored under `key`, or under their own cache key when
  /// the caller could not resolve one. Dropping the stream cancels the fetch.
  pub fn read<T, F, Fut>(
    &self,
    key: Option<String>,
    fetch: F,
  ) -> impl Stream<Item = Resource<T>> + Send + 'static
  where
    T: Cacheable,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = SyncResult<T>> + Send + 'static,
  {
    let layer = self.clone();
    stream::unfold(ReadStep::Cache { key, fetch }, move |step| {
      let layer = layer.clone();
      async move {
        match step {
          ReadStep::Cache { key, fetch } => {
            if let Some(k) = key.as_deref() {
              match layer.cached::<T>(k).await {
                Ok(Some(entry)) => {
                  debug!(entity = T::entity_type(), key = k, "Serving cached value");
                  return Some((Resource::Success(entry.value), ReadStep::Network { key, fetch }));
                }
                Ok(None) => {}
                Err(e) => warn!(entity = T::entity_type(), error = %e, "Cache lookup failed"),
              }
            }
            layer
              .fetch_and_store(key, fetch, false)
              .await
              .map(|resource| (resource, ReadStep::Done))
          }
          ReadStep::Network { key, fetch } => layer
            .fetch_and_store(key, fetch, true)
            .await
            .map(|resource| (resource, ReadStep::Done)),
          ReadStep::Done => None,
        }
      }
    })
  }

  /// Network-only refresh (pull-to-refresh).
  ///
  /// Persists the fresh value on success and returns a single terminal result.
  pub async fn refresh<T, F, Fut>(&self, key: Option<String>, fetch: F) -> Resource<T>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
  {
    match self.fetch_and_store(key, fetch, false).await {
      Some(resource) => resource,
      None => Resource::Error(SyncError::EmptyPayload),
    }
  }

  /// Returns `None` when a failure is swallowed because data was already shown.
  async fn fetch_and_store<T, F, Fut>(
    &self,
    key: Option<String>,
    fetch: F,
    already_emitted: bool,
  ) -> Option<Resource<T>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
  {
    match fetch().await {
      Ok(fresh) => {
        let key = key.unwrap_or_else(|| fresh.cache_key());
        if let Err(e) = self.store(key.clone(), fresh.clone()).await {
          warn!(entity = T::entity_type(), key = %key, error = %e, "Failed to cache fresh value");
        }
        Some(Resource::Success(fresh))
      }
      Err(e) if already_emitted => {
        debug!(entity = T::entity_type(), error = %e, "Network refresh failed, keeping cached value");
        None
      }
      Err(e) => Some(Resource::Error(e)),
    }
  }
}

impl<S: LocalStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
