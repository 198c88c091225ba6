use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use super::state::PageState;
use crate::resource::Resource;
use crate::shop::types::Page;

/// How a loaded follow-up page gets appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
  /// Wait for an explicit `commit_pending` (animation finished)
  Manual,
  /// Commit automatically after the delay
  After(Duration),
}

impl Settle {
  pub fn from_millis(delay_ms: Option<u64>) -> Self {
    match delay_ms {
      Some(ms) => Settle::After(Duration::from_millis(ms)),
      None => Settle::Manual,
    }
  }
}

/// Async driver around `PageState`.
///
/// Owns the list state in a watch channel so a screen can render snapshots
/// while loads are in flight. Fetch functions return a stream of results for
/// the requested page; every emission is applied in order, so a cache-backed
/// first page shows cached rows before the network answers.
pub struct ListLoader<T> {
  state: watch::Sender<PageState<T>>,
  settle: Settle,
}

impl<T: Clone + Send + Sync + 'static> ListLoader<T> {
  pub fn new(settle: Settle) -> Self {
    let (state, _rx) = watch::channel(PageState::new());
    Self { state, settle }
  }

  pub fn snapshot(&self) -> PageState<T> {
    self.state.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<PageState<T>> {
    self.state.subscribe()
  }

  /// Load the first page from scratch.
  pub async fn retry<F, St>(&self, fetch: F)
  where
    F: FnOnce(u32) -> St,
    St: Stream<Item = Resource<Page<T>>>,
  {
    let mut page = 1;
    self.state.send_modify(|s| page = s.retry_request());
    self.run(page, fetch).await;
  }

  /// Pull-to-refresh. Returns false if ignored.
  pub async fn refresh<F, St>(&self, fetch: F) -> bool
  where
    F: FnOnce(u32) -> St,
    St: Stream<Item = Resource<Page<T>>>,
  {
    let mut requested = None;
    self.state.send_if_modified(|s| {
      requested = s.on_refresh();
      requested.is_some()
    });
    match requested {
      Some(page) => {
        self.run(page, fetch).await;
        true
      }
      None => false,
    }
  }

  /// Load the next page. Returns false if ignored.
  pub async fn load_more<F, St>(&self, fetch: F) -> bool
  where
    F: FnOnce(u32) -> St,
    St: Stream<Item = Resource<Page<T>>>,
  {
    let mut requested = None;
    self.state.send_if_modified(|s| {
      requested = s.on_load_more();
      requested.is_some()
    });
    let Some(page) = requested else {
      return false;
    };

    self.run(page, fetch).await;

    if let Settle::After(delay) = self.settle {
      if self.state.borrow().has_pending() {
        tokio::time::sleep(delay).await;
        self.commit_pending();
      }
    }
    true
  }

  /// Append a loaded page once the load-more animation completed.
  pub fn commit_pending(&self) -> bool {
    self.state.send_if_modified(|s| s.commit_pending())
  }

  pub fn should_trigger_load_more(&self, last_visible_index: usize, total_count: usize) -> bool {
    self
      .state
      .borrow()
      .should_trigger_load_more(last_visible_index, total_count)
  }

  async fn run<F, St>(&self, page: u32, fetch: F)
  where
    F: FnOnce(u32) -> St,
    St: Stream<Item = Resource<Page<T>>>,
  {
    let mut results = std::pin::pin!(fetch(page));
    while let Some(resource) = results.next().await {
      self.state.send_if_modified(|s| {
        if s.page() != page {
          debug!(requested = page, current = s.page(), "Dropping stale page result");
          return false;
        }
        match resource {
          Resource::Loading => false,
          Resource::Success(data) => {
            s.apply_success(data);
            true
          }
          Resource::Error(e) => {
            debug!(page, error = %e, "Page load failed");
            s.apply_error(e);
            true
          }
        }
      });
    }
  }
}
