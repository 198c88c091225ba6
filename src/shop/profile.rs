use chrono::Utc;
use futures::Stream;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheLayer, Cacheable, LocalStore};
use crate::error::SyncResult;
use crate::identity::{
  DurableKvTier, FirstRecordTier, IdentityResolver, IdentityTier, NetworkTier, SessionTier,
};
use crate::kv::SharedKv;
use crate::optimistic::{OptimisticWriter, WriteOutcome};
use crate::resource::Resource;
use crate::session::SessionStore;
use crate::shop::client::ShopApi;
use crate::shop::types::UserProfile;

/// Offline-first access to the current user's profile.
pub struct ProfileRepository<A: ShopApi, S: LocalStore> {
  api: Arc<A>,
  cache: CacheLayer<S>,
  session: SessionStore,
  writer: OptimisticWriter<S>,
}

impl<A: ShopApi, S: LocalStore> ProfileRepository<A, S> {
  pub fn new(api: Arc<A>, cache: CacheLayer<S>, session: SessionStore, kv: SharedKv) -> Self {
    let network = {
      let api = Arc::clone(&api);
      let cache = cache.clone();
      NetworkTier::new(move || {
        let api = Arc::clone(&api);
        let cache = cache.clone();
        async move {
          let profile = api.fetch_profile().await.into_result()?;
          let id = profile.user_id;
          if let Err(e) = cache.store(profile.cache_key(), profile).await {
            warn!(error = %e, "Failed to cache profile fetched for identity");
          }
          Ok(id)
        }
      })
    };

    let tiers: Vec<Box<dyn IdentityTier>> = vec![
      Box::new(SessionTier::new(session.clone())),
      Box::new(FirstRecordTier::new(cache.clone(), |p: &UserProfile| {
        p.user_id
      })),
      Box::new(DurableKvTier::new(Arc::clone(&kv))),
      Box::new(network),
    ];
    let resolver = Arc::new(IdentityResolver::new(tiers).with_mirror(kv));

    Self {
      writer: OptimisticWriter::new(cache.clone(), resolver),
      api,
      cache,
      session,
    }
  }

  fn subject_key(&self) -> Option<String> {
    self.session.get().subject_id().map(|id| id.to_string())
  }

  /// Cached profile first, then the network copy.
  pub fn profile(&self) -> impl Stream<Item = Resource<UserProfile>> + Send + 'static {
    let api = Arc::clone(&self.api);
    self
      .cache
      .read(self.subject_key(), move || async move {
        api.fetch_profile().await.into_result()
      })
  }

  /// Network-only reload.
  pub async fn refresh_profile(&self) -> Resource<UserProfile> {
    let api = Arc::clone(&self.api);
    self
      .cache
      .refresh(self.subject_key(), || async move {
        api.fetch_profile().await.into_result()
      })
      .await
  }

  /// Apply `edit` to the cached profile now and push it to the server in the
  /// background.
  pub async fn update_profile<E>(&self, edit: E) -> SyncResult<WriteOutcome<UserProfile>>
  where
    E: FnOnce(&mut UserProfile),
  {
    let api = Arc::clone(&self.api);
    self
      .writer
      .write(
        |id, current: Option<UserProfile>| {
          let mut profile = current.unwrap_or_else(|| UserProfile::placeholder(id));
          edit(&mut profile);
          profile.updated_at = Utc::now().timestamp_millis();
          profile
        },
        move |profile| async move { api.update_profile(&profile).await.into_unit() },
      )
      .await
  }

  pub async fn update_nickname(&self, nickname: String) -> SyncResult<WriteOutcome<UserProfile>> {
    self.update_profile(|p| p.nickname = nickname).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::error::SyncError;
  use crate::kv::{DurableKv, MemoryKv, USER_ID_KEY};
  use crate::session::AuthTokens;
  use crate::shop::api_types::ApiResponse;
  use crate::shop::fake::FakeApi;
  use futures::StreamExt;

  fn profile(id: i64, nickname: &str) -> UserProfile {
    UserProfile {
      user_id: id,
      nickname: nickname.to_string(),
      avatar: None,
      gender: None,
      updated_at: 1,
    }
  }

  struct Fixture {
    api: Arc<FakeApi>,
    cache: CacheLayer<MemoryStorage>,
    session: SessionStore,
    kv: Arc<MemoryKv>,
    repo: ProfileRepository<FakeApi, MemoryStorage>,
  }

  fn fixture() -> Fixture {
    let api = Arc::new(FakeApi::default());
    let cache = CacheLayer::new(MemoryStorage::new());
    let kv = Arc::new(MemoryKv::new());
    let session = SessionStore::new(kv.clone());
    let repo = ProfileRepository::new(api.clone(), cache.clone(), session.clone(), kv.clone());
    Fixture {
      api,
      cache,
      session,
      kv,
      repo,
    }
  }

  async fn login(session: &SessionStore, id: i64) {
    let tokens = AuthTokens {
      token: "t".into(),
      refresh_token: "r".into(),
      expire: 3600,
      refresh_expire: 7200,
    };
    session.save(tokens, id).await.unwrap();
  }

  #[tokio::test]
  async fn test_profile_emits_cached_then_fresh() {
    let f = fixture();
    login(&f.session, 7).await;
    f.cache.store("7".to_string(), profile(7, "old")).await.unwrap();
    f.api.set_profile(ApiResponse::ok(profile(7, "new")));

    let emitted: Vec<_> = f.repo.profile().collect().await;
    assert_eq!(
      emitted,
      vec![
        Resource::Success(profile(7, "old")),
        Resource::Success(profile(7, "new"))
      ]
    );
  }

  #[tokio::test]
  async fn test_profile_offline_without_cache_errors() {
    let f = fixture();
    login(&f.session, 7).await;
    f.api.set_profile(ApiResponse::failed("offline"));

    let emitted: Vec<_> = f.repo.profile().collect().await;
    assert_eq!(
      emitted,
      vec![Resource::Error(SyncError::NetworkFailure("offline".into()))]
    );
  }

  #[tokio::test]
  async fn test_refresh_profile_persists_by_user_id() {
    let f = fixture();
    f.api.set_profile(ApiResponse::ok(profile(12, "fresh")));

    let result = f.repo.refresh_profile().await;
    assert_eq!(result, Resource::Success(profile(12, "fresh")));
    let cached = f.cache.cached::<UserProfile>("12").await.unwrap().unwrap();
    assert_eq!(cached.value.nickname, "fresh");
  }

  #[tokio::test]
  async fn test_update_nickname_is_optimistic() {
    let f = fixture();
    login(&f.session, 7).await;
    f.cache.store("7".to_string(), profile(7, "old")).await.unwrap();
    f.api.set_update(ApiResponse::failed("server down"));

    let outcome = f.repo.update_nickname("neo".to_string()).await.unwrap();
    assert_eq!(outcome.value.nickname, "neo");
    outcome.sync.await.unwrap();

    // Server rejected it, the local value stays
    let cached = f.cache.cached::<UserProfile>("7").await.unwrap().unwrap();
    assert_eq!(cached.value.nickname, "neo");
    assert_eq!(f.api.updated_nicknames(), vec!["neo".to_string()]);
  }

  #[tokio::test]
  async fn test_update_after_session_reset_uses_durable_id() {
    let f = fixture();
    login(&f.session, 42).await;
    f.session.clear().await.unwrap();
    f.api.set_profile(ApiResponse::failed("offline"));

    let outcome = f.repo.update_nickname("ghost".to_string()).await.unwrap();
    assert_eq!(outcome.subject_id, 42);
    assert_eq!(f.api.profile_calls(), 0);
    outcome.sync.await.unwrap();
  }

  #[tokio::test]
  async fn test_network_tier_resolves_and_caches() {
    let f = fixture();
    f.api.set_profile(ApiResponse::ok(profile(5, "remote")));

    let outcome = f.repo.update_nickname("local".to_string()).await.unwrap();
    assert_eq!(outcome.subject_id, 5);
    assert_eq!(outcome.value.nickname, "local");
    assert_eq!(f.api.profile_calls(), 1);

    assert_eq!(f.kv.get(USER_ID_KEY).unwrap().as_deref(), Some("5"));
  }
}
