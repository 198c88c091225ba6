//! Optimistic writes with detached background sync.
//!
//! A write resolves the subject id, applies the mutation to the cache, and
//! reports success right away. The network write runs afterwards on its own
//! task. A failed network write is logged and the local value is kept; the
//! next successful sync is expected to converge the two.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheLayer, Cacheable, LocalStore};
use crate::error::{SyncError, SyncResult};
use crate::identity::IdentityResolver;

/// Result of an accepted optimistic write.
#[derive(Debug)]
pub struct WriteOutcome<T> {
  pub subject_id: i64,
  /// The value now in the cache
  pub value: T,
  /// Handle of the background sync. Dropping it does not cancel the sync.
  pub sync: JoinHandle<()>,
}

/// Applies optimistic writes keyed by the resolved subject id.
pub struct OptimisticWriter<S: LocalStore> {
  cache: CacheLayer<S>,
  resolver: Arc<IdentityResolver>,
  /// One lock per cache key; held only while the cache entry is mutated.
  /// Entries are removed once no writer holds or awaits them.
  locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl<S: LocalStore> OptimisticWriter<S> {
  pub fn new(cache: CacheLayer<S>, resolver: Arc<IdentityResolver>) -> Self {
    Self {
      cache,
      resolver,
      locks: Arc::new(DashMap::new()),
    }
  }

  fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
    self
      .locks
      .entry(key.to_string())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone()
  }

  fn release_lock(&self, key: &str) {
    self
      .locks
      .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
  }

  /// Resolve the subject, mutate its cache entry, then sync in the background.
  ///
  /// `mutate` receives the subject id and the currently cached value, if any,
  /// and returns the new value. `sync` receives the new value and performs the
  /// network write. Fails with `IdentityUnresolved` before touching the cache
  /// when no tier yields an id.
  pub async fn write<T, M, F, Fut>(&self, mutate: M, sync: F) -> SyncResult<WriteOutcome<T>>
  where
    T: Cacheable,
    M: FnOnce(i64, Option<T>) -> T,
    F: FnOnce(T) -> Fut + Send + 'static,
    Fut: Future<Output = SyncResult<()>> + Send + 'static,
  {
    let resolved = self.resolver.resolve().await?;
    let key = resolved.id.to_string();

    let lock = self.lock_for(&key);
    let applied = async {
      let _guard = lock.lock().await;

      let current = self.cache.cached::<T>(&key).await?.map(|e| e.value);
      let value = mutate(resolved.id, current);
      self.cache.store(key.clone(), value.clone()).await?;
      Ok::<_, SyncError>(value)
    }
    .await;
    drop(lock);
    self.release_lock(&key);
    let value = applied?;
    debug!(
      entity = T::entity_type(),
      key = %key,
      tier = resolved.tier,
      "Applied optimistic write"
    );

    let sync = spawn_sync(T::entity_type(), key, sync(value.clone()));

    Ok(WriteOutcome {
      subject_id: resolved.id,
      value,
      sync,
    })
  }
}

/// Run the network write on a detached task, independent of the caller.
fn spawn_sync<Fut>(entity: &'static str, key: String, fut: Fut) -> JoinHandle<()>
where
  Fut: Future<Output = SyncResult<()>> + Send + 'static,
{
  tokio::spawn(async move {
    match fut.await {
      Ok(()) => info!(entity, key = %key, "Background sync completed"),
      Err(e) => warn!(
        entity,
        key = %key,
        error = %e,
        "Background sync failed, keeping local value"
      ),
    }
  })
}

impl<S: LocalStore> Clone for OptimisticWriter<S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      resolver: Arc::clone(&self.resolver),
      locks: Arc::clone(&self.locks),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::identity::{DurableKvTier, FirstRecordTier, IdentityTier, NetworkTier, SessionTier};
  use crate::kv::{DurableKv, MemoryKv, SharedKv, USER_ID_KEY};
  use crate::session::SessionStore;
  use crate::shop::types::UserProfile;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
  use std::time::Duration;
  use tokio::sync::oneshot;

  struct Harness {
    cache: CacheLayer<MemoryStorage>,
    kv: Arc<MemoryKv>,
    network_calls: Arc<AtomicU32>,
    writer: OptimisticWriter<MemoryStorage>,
  }

  fn harness() -> Harness {
    let cache = CacheLayer::new(MemoryStorage::new());
    let kv = Arc::new(MemoryKv::new());
    let shared: SharedKv = kv.clone();
    let session = SessionStore::new(shared.clone());
    let network_calls = Arc::new(AtomicU32::new(0));

    let calls = network_calls.clone();
    let tiers: Vec<Box<dyn IdentityTier>> = vec![
      Box::new(SessionTier::new(session)),
      Box::new(FirstRecordTier::new(cache.clone(), |p: &UserProfile| p.user_id)),
      Box::new(DurableKvTier::new(shared)),
      Box::new(NetworkTier::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(SyncError::NetworkFailure("offline".into())) }
      })),
    ];
    let writer = OptimisticWriter::new(cache.clone(), Arc::new(IdentityResolver::new(tiers)));

    Harness {
      cache,
      kv,
      network_calls,
      writer,
    }
  }

  fn rename(name: &'static str) -> impl FnOnce(i64, Option<UserProfile>) -> UserProfile {
    move |id, current| {
      let mut profile = current.unwrap_or_else(|| UserProfile::placeholder(id));
      profile.nickname = name.to_string();
      profile
    }
  }

  #[tokio::test]
  async fn test_durable_tier_fallback_keys_the_mutation() {
    let h = harness();
    h.kv.put(USER_ID_KEY, "42").unwrap();

    let outcome = h
      .writer
      .write(rename("neo"), |_p| async { Ok(()) })
      .await
      .unwrap();

    assert_eq!(outcome.subject_id, 42);
    let cached = h.cache.cached::<UserProfile>("42").await.unwrap().unwrap();
    assert_eq!(cached.value.nickname, "neo");
    assert_eq!(cached.value.user_id, 42);
    assert_eq!(h.network_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_unresolved_identity_mutates_nothing() {
    let h = harness();
    let result = h
      .writer
      .write(rename("neo"), |_p| async { Ok(()) })
      .await;

    assert!(matches!(result, Err(SyncError::IdentityUnresolved)));
    assert_eq!(h.network_calls.load(Ordering::SeqCst), 1);
    assert!(h.cache.first_record::<UserProfile>().await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_success_returned_before_sync_completes() {
    let h = harness();
    h.kv.put(USER_ID_KEY, "3").unwrap();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let finished = Arc::new(AtomicBool::new(false));

    let done = finished.clone();
    let outcome = h
      .writer
      .write(rename("pending"), move |_p| async move {
        let _ = release_rx.await;
        done.store(true, Ordering::SeqCst);
        Ok(())
      })
      .await
      .unwrap();

    assert!(!finished.load(Ordering::SeqCst));
    release_tx.send(()).unwrap();
    outcome.sync.await.unwrap();
    assert!(finished.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_sync_outlives_dropped_handle_and_caller() {
    let h = harness();
    h.kv.put(USER_ID_KEY, "3").unwrap();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    let writer = h.writer.clone();
    let caller = tokio::spawn(async move {
      let outcome = writer
        .write(rename("detached"), move |_p| async move {
          tokio::time::sleep(Duration::from_millis(20)).await;
          let _ = done_tx.send(());
          Ok(())
        })
        .await
        .unwrap();
      drop(outcome.sync);
    });
    caller.await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), done_rx)
      .await
      .expect("sync should finish after the caller is gone")
      .unwrap();
  }

  #[tokio::test]
  async fn test_failed_sync_keeps_local_value() {
    let h = harness();
    h.kv.put(USER_ID_KEY, "3").unwrap();

    let outcome = h
      .writer
      .write(rename("kept"), |_p| async {
        Err(SyncError::NetworkFailure("500".into()))
      })
      .await
      .unwrap();
    outcome.sync.await.unwrap();

    let cached = h.cache.cached::<UserProfile>("3").await.unwrap().unwrap();
    assert_eq!(cached.value.nickname, "kept");
  }

  #[tokio::test]
  async fn test_concurrent_writes_to_same_key_do_not_lose_updates() {
    let h = harness();
    h.kv.put(USER_ID_KEY, "1").unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
      let writer = h.writer.clone();
      tasks.push(tokio::spawn(async move {
        writer
          .write(
            |id, current: Option<UserProfile>| {
              let mut profile = current.unwrap_or_else(|| UserProfile::placeholder(id));
              profile.updated_at += 1;
              profile
            },
            |_p| async { Ok(()) },
          )
          .await
          .unwrap()
      }));
    }
    for task in tasks {
      task.await.unwrap();
    }

    // Every read-modify-write was applied on top of the previous one
    let cached = h.cache.cached::<UserProfile>("1").await.unwrap().unwrap();
    assert_eq!(cached.value.updated_at, 20);
    assert!(h.writer.locks.is_empty());
  }

  #[tokio::test]
  async fn test_lock_entry_is_released_after_write() {
    let h = harness();
    h.kv.put(USER_ID_KEY, "5").unwrap();

    h.writer
      .write(rename("once"), |_p| async { Ok(()) })
      .await
      .unwrap();
    assert!(h.writer.locks.is_empty());

    // A lock someone still holds is kept
    let held = h.writer.lock_for("6");
    h.writer.release_lock("6");
    assert!(h.writer.locks.contains_key("6"));
    drop(held);
    h.writer.release_lock("6");
    assert!(h.writer.locks.is_empty());
  }

  #[tokio::test]
  async fn test_different_keys_do_not_share_a_lock() {
    let h = harness();
    let held = h.writer.lock_for("1");
    let _guard = held.lock().await;

    let other = h.writer.lock_for("2");
    assert!(other.try_lock().is_ok());
    assert!(h.writer.lock_for("1").try_lock().is_err());
  }
}
