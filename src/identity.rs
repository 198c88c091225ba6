//! Subject identity resolution through an ordered fallback chain.
//!
//! Writes keyed by the current user need an id even when the session has not
//! settled yet (e.g. right after an app restart). Each tier is tried in order
//! and the first positive id wins:
//!
//! 1. In-memory session snapshot
//! 2. Oldest cached record of the subject's entity type
//! 3. Durable key-value store
//! 4. Forced network refresh

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, Cacheable, LocalStore};
use crate::error::{SyncError, SyncResult};
use crate::kv::{self, SharedKv, USER_ID_KEY};
use crate::session::SessionStore;

/// One strategy in the fallback chain.
#[async_trait]
pub trait IdentityTier: Send + Sync {
  /// Name used in logs
  fn name(&self) -> &'static str;

  /// Candidate id, if this source has one. Non-positive ids are ignored.
  async fn resolve(&self) -> Option<i64>;
}

/// Reads the user id from the current session.
pub struct SessionTier {
  session: SessionStore,
}

impl SessionTier {
  pub fn new(session: SessionStore) -> Self {
    Self { session }
  }
}

#[async_trait]
impl IdentityTier for SessionTier {
  fn name(&self) -> &'static str {
    "session"
  }

  async fn resolve(&self) -> Option<i64> {
    Some(self.session.get().user_id)
  }
}

/// Reads the subject id from the first cached record of type `T`.
pub struct FirstRecordTier<T, S: LocalStore> {
  cache: CacheLayer<S>,
  subject_id: fn(&T) -> i64,
}

impl<T: Cacheable, S: LocalStore> FirstRecordTier<T, S> {
  pub fn new(cache: CacheLayer<S>, subject_id: fn(&T) -> i64) -> Self {
    Self { cache, subject_id }
  }
}

#[async_trait]
impl<T: Cacheable, S: LocalStore> IdentityTier for FirstRecordTier<T, S> {
  fn name(&self) -> &'static str {
    "local_first_record"
  }

  async fn resolve(&self) -> Option<i64> {
    match self.cache.first_record::<T>().await {
      Ok(entry) => entry.map(|e| (self.subject_id)(&e.value)),
      Err(e) => {
        warn!(error = %e, "First record scan failed");
        None
      }
    }
  }
}

/// Reads the mirrored user id from the durable store.
pub struct DurableKvTier {
  kv: SharedKv,
}

impl DurableKvTier {
  pub fn new(kv: SharedKv) -> Self {
    Self { kv }
  }
}

#[async_trait]
impl IdentityTier for DurableKvTier {
  fn name(&self) -> &'static str {
    "durable_kv"
  }

  async fn resolve(&self) -> Option<i64> {
    match kv::get_blocking(&self.kv, USER_ID_KEY).await {
      Ok(value) => value.and_then(|v| v.trim().parse().ok()),
      Err(e) => {
        warn!(error = %e, "Durable store lookup failed");
        None
      }
    }
  }
}

type RefreshFn = Box<dyn Fn() -> BoxFuture<'static, SyncResult<i64>> + Send + Sync>;

/// Last resort: ask the server who we are.
pub struct NetworkTier {
  refresh: RefreshFn,
}

impl NetworkTier {
  pub fn new<F, Fut>(refresh: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<i64>> + Send + 'static,
  {
    Self {
      refresh: Box::new(move || Box::pin(refresh())),
    }
  }
}

#[async_trait]
impl IdentityTier for NetworkTier {
  fn name(&self) -> &'static str {
    "network"
  }

  async fn resolve(&self) -> Option<i64> {
    match (self.refresh)().await {
      Ok(id) => Some(id),
      Err(e) => {
        warn!(error = %e, "Identity refresh from network failed");
        None
      }
    }
  }
}

/// A resolved subject id and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
  pub id: i64,
  pub tier: &'static str,
}

/// Ordered fallback chain of identity tiers.
pub struct IdentityResolver {
  tiers: Vec<Box<dyn IdentityTier>>,
  mirror: Option<SharedKv>,
}

impl IdentityResolver {
  pub fn new(tiers: Vec<Box<dyn IdentityTier>>) -> Self {
    Self {
      tiers,
      mirror: None,
    }
  }

  /// Write every resolved id back to the durable store so later resolutions
  /// succeed at tier 3 even after the session is reset.
  pub fn with_mirror(mut self, kv: SharedKv) -> Self {
    self.mirror = Some(kv);
    self
  }

  pub fn tier_names(&self) -> Vec<&'static str> {
    self.tiers.iter().map(|t| t.name()).collect()
  }

  /// Try each tier in order, stopping at the first positive id.
  pub async fn resolve(&self) -> SyncResult<Resolved> {
    for tier in &self.tiers {
      match tier.resolve().await {
        Some(id) if id > 0 => {
          debug!(tier = tier.name(), id, "Resolved subject id");
          self.mirror_id(id).await;
          return Ok(Resolved {
            id,
            tier: tier.name(),
          });
        }
        candidate => debug!(tier = tier.name(), ?candidate, "No usable id"),
      }
    }

    warn!(tiers = ?self.tier_names(), "No tier produced a subject id");
    Err(SyncError::IdentityUnresolved)
  }

  async fn mirror_id(&self, id: i64) {
    let Some(kv) = &self.mirror else {
      return;
    };
    let value = id.to_string();
    match kv::get_blocking(kv, USER_ID_KEY).await {
      Ok(Some(existing)) if existing == value => {}
      _ => {
        if let Err(e) = kv::put_blocking(kv, USER_ID_KEY, value).await {
          warn!(error = %e, "Failed to mirror subject id");
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::kv::{DurableKv, MemoryKv};
  use crate::session::AuthTokens;
  use crate::shop::types::UserProfile;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  struct Fixed(&'static str, Option<i64>, Arc<AtomicU32>);

  #[async_trait]
  impl IdentityTier for Fixed {
    fn name(&self) -> &'static str {
      self.0
    }

    async fn resolve(&self) -> Option<i64> {
      self.2.fetch_add(1, Ordering::SeqCst);
      self.1
    }
  }

  fn fixed(name: &'static str, id: Option<i64>) -> (Box<dyn IdentityTier>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    (Box::new(Fixed(name, id, calls.clone())), calls)
  }

  #[tokio::test]
  async fn test_first_positive_tier_wins_and_short_circuits() {
    let (a, a_calls) = fixed("a", Some(0));
    let (b, b_calls) = fixed("b", None);
    let (c, c_calls) = fixed("c", Some(42));
    let (d, d_calls) = fixed("d", Some(7));
    let resolver = IdentityResolver::new(vec![a, b, c, d]);

    let resolved = resolver.resolve().await.unwrap();
    assert_eq!(resolved, Resolved { id: 42, tier: "c" });
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    assert_eq!(d_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_negative_ids_are_not_usable() {
    let (a, _) = fixed("a", Some(-3));
    let resolver = IdentityResolver::new(vec![a]);
    assert_eq!(
      resolver.resolve().await,
      Err(SyncError::IdentityUnresolved)
    );
  }

  #[tokio::test]
  async fn test_session_tier() {
    let session = SessionStore::new(Arc::new(MemoryKv::new()));
    let tier = SessionTier::new(session.clone());
    assert_eq!(tier.resolve().await, Some(0));

    session
      .save(
        AuthTokens {
          token: "t".into(),
          refresh_token: "r".into(),
          expire: 60,
          refresh_expire: 60,
        },
        11,
      )
      .await
      .unwrap();
    assert_eq!(tier.resolve().await, Some(11));
  }

  #[tokio::test]
  async fn test_first_record_tier() {
    let cache = CacheLayer::new(MemoryStorage::new());
    let tier = FirstRecordTier::new(cache.clone(), |p: &UserProfile| p.user_id);
    assert_eq!(tier.resolve().await, None);

    cache
      .store("5".to_string(), UserProfile::placeholder(5))
      .await
      .unwrap();
    cache
      .store("6".to_string(), UserProfile::placeholder(6))
      .await
      .unwrap();
    assert_eq!(tier.resolve().await, Some(5));
  }

  #[tokio::test]
  async fn test_durable_kv_tier_ignores_garbage() {
    let kv = Arc::new(MemoryKv::new());
    let tier = DurableKvTier::new(kv.clone());
    assert_eq!(tier.resolve().await, None);

    kv.put(USER_ID_KEY, "not a number").unwrap();
    assert_eq!(tier.resolve().await, None);

    kv.put(USER_ID_KEY, "42").unwrap();
    assert_eq!(tier.resolve().await, Some(42));
  }

  #[tokio::test]
  async fn test_network_tier_failure_yields_none() {
    let tier = NetworkTier::new(|| async { Err(SyncError::NetworkFailure("down".into())) });
    assert_eq!(tier.resolve().await, None);

    let tier = NetworkTier::new(|| async { Ok(99) });
    assert_eq!(tier.resolve().await, Some(99));
  }

  #[tokio::test]
  async fn test_resolved_id_is_mirrored() {
    let kv = Arc::new(MemoryKv::new());
    let (a, _) = fixed("a", Some(8));
    let resolver = IdentityResolver::new(vec![a]).with_mirror(kv.clone());

    resolver.resolve().await.unwrap();
    assert_eq!(kv.get(USER_ID_KEY).unwrap().as_deref(), Some("8"));
  }
}
