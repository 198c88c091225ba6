use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheLayer, LocalStore};
use crate::error::SyncResult;
use crate::resource::Resource;
use crate::session::SessionStore;
use crate::shop::cache::{ListKind, ListQueryKey};
use crate::shop::client::ShopApi;
use crate::shop::types::{Conversation, Footprint, Page};

type PageFetch<T> = Arc<dyn Fn(u32, u32) -> BoxFuture<'static, SyncResult<Page<T>>> + Send + Sync>;

/// Paged list source feeding a `ListLoader`.
///
/// The first page of a logged-in user's list is read offline-first and
/// cached per user and page size. Later pages always come from the network.
pub struct PagedRepository<T, S: LocalStore> {
  kind: ListKind,
  cache: CacheLayer<S>,
  session: SessionStore,
  size: u32,
  fetch: PageFetch<T>,
}

impl<T, S> PagedRepository<T, S>
where
  T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
  S: LocalStore,
{
  pub fn new<F, Fut>(
    kind: ListKind,
    cache: CacheLayer<S>,
    session: SessionStore,
    size: u32,
    fetch: F,
  ) -> Self
  where
    F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SyncResult<Page<T>>> + Send + 'static,
  {
    Self {
      kind,
      cache,
      session,
      size,
      fetch: Arc::new(move |page, size| Box::pin(fetch(page, size))),
    }
  }

  pub fn kind(&self) -> ListKind {
    self.kind
  }

  pub fn page_size(&self) -> u32 {
    self.size
  }

  fn first_page_key(&self) -> Option<String> {
    self.session.get().subject_id().map(|user_id| {
      ListQueryKey {
        kind: self.kind,
        user_id,
        size: self.size,
      }
      .cache_hash()
    })
  }

  /// Results for `page`, in the order they should be applied.
  pub fn page(&self, page: u32) -> BoxStream<'static, Resource<Page<T>>> {
    let fetch = Arc::clone(&self.fetch);
    let size = self.size;

    match (page, self.first_page_key()) {
      (1, Some(key)) => self.cache.read(Some(key), move || fetch(1, size)).boxed(),
      // Without a user the first page cannot be keyed, so it is not cached
      _ => stream::once(async move { Resource::from(fetch(page, size).await) }).boxed(),
    }
  }
}

/// Browsing history of the current user.
pub fn footprints<A: ShopApi, S: LocalStore>(
  api: Arc<A>,
  cache: CacheLayer<S>,
  session: SessionStore,
  size: u32,
) -> PagedRepository<Footprint, S> {
  PagedRepository::new(ListKind::Footprints, cache, session, size, move |page, size| {
    let api = Arc::clone(&api);
    async move { api.fetch_footprints(page, size).await.into_result() }
  })
}

/// Chat conversations of the current user.
pub fn conversations<A: ShopApi, S: LocalStore>(
  api: Arc<A>,
  cache: CacheLayer<S>,
  session: SessionStore,
  size: u32,
) -> PagedRepository<Conversation, S> {
  PagedRepository::new(ListKind::Conversations, cache, session, size, move |page, size| {
    let api = Arc::clone(&api);
    async move { api.fetch_conversations(page, size).await.into_result() }
  })
}
