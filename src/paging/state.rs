use crate::error::SyncError;
use crate::shop::types::Page;

/// Coarse state of a list screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
  Loading,
  Success,
  Empty,
  Error,
}

/// State of the load-more footer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMoreState {
  /// Idle, more pages may exist
  PullToLoad,
  Loading,
  /// A page arrived and is waiting to be committed
  Success,
  NoMore,
  Error,
}

/// Rows from the end of the list at which the next page is requested.
const PREFETCH_DISTANCE: usize = 3;

#[derive(Debug, Clone)]
struct PendingPage<T> {
  items: Vec<T>,
  has_next: bool,
}

/// Paged list bookkeeping for one list screen.
///
/// Action methods return the page to fetch, or `None` when the action is a
/// no-op. Results are fed back with `apply_success` / `apply_error` while
/// `page` still holds the requested page number.
#[derive(Debug, Clone)]
pub struct PageState<T> {
  page: u32,
  items: Vec<T>,
  ui_state: UiState,
  load_more_state: LoadMoreState,
  is_refreshing: bool,
  last_error: Option<SyncError>,
  pending: Option<PendingPage<T>>,
}

impl<T> Default for PageState<T> {
  fn default() -> Self {
    Self {
      page: 1,
      items: Vec::new(),
      ui_state: UiState::Loading,
      load_more_state: LoadMoreState::PullToLoad,
      is_refreshing: false,
      last_error: None,
      pending: None,
    }
  }
}

impl<T> PageState<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn items(&self) -> &[T] {
    &self.items
  }

  pub fn ui_state(&self) -> UiState {
    self.ui_state
  }

  pub fn load_more_state(&self) -> LoadMoreState {
    self.load_more_state
  }

  pub fn is_refreshing(&self) -> bool {
    self.is_refreshing
  }

  pub fn last_error(&self) -> Option<&SyncError> {
    self.last_error.as_ref()
  }

  pub fn has_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Restart from the first page (retry button).
  pub fn retry_request(&mut self) -> u32 {
    self.page = 1;
    self.load_more_state = LoadMoreState::Loading;
    self.page
  }

  /// Pull-to-refresh. Ignored while a load is in flight.
  pub fn on_refresh(&mut self) -> Option<u32> {
    if self.load_more_state == LoadMoreState::Loading {
      return None;
    }
    self.is_refreshing = true;
    self.page = 1;
    Some(self.page)
  }

  /// Request the next page. Ignored while loading, when there is nothing
  /// more, or while a loaded page is waiting to be committed.
  pub fn on_load_more(&mut self) -> Option<u32> {
    if matches!(
      self.load_more_state,
      LoadMoreState::Loading | LoadMoreState::NoMore | LoadMoreState::Success
    ) {
      return None;
    }
    self.load_more_state = LoadMoreState::Loading;
    self.page += 1;
    Some(self.page)
  }

  /// Apply a successful page for the current page number.
  ///
  /// The first page replaces the list. Later pages are held as pending with
  /// `LoadMoreState::Success` until `commit_pending` appends them.
  pub fn apply_success(&mut self, page: Page<T>) {
    let has_next = page.pagination.has_next_page();
    self.last_error = None;

    if self.page == 1 {
      self.items = page.list;
      self.pending = None;
      self.is_refreshing = false;
      self.ui_state = if self.items.is_empty() {
        UiState::Empty
      } else {
        UiState::Success
      };
      self.load_more_state = more_state(has_next);
    } else {
      self.load_more_state = LoadMoreState::Success;
      self.pending = Some(PendingPage {
        items: page.list,
        has_next,
      });
    }
  }

  /// Append the pending page once the load-more animation has finished.
  ///
  /// Returns false when nothing was pending.
  pub fn commit_pending(&mut self) -> bool {
    match self.pending.take() {
      Some(pending) => {
        self.items.extend(pending.items);
        self.load_more_state = more_state(pending.has_next);
        true
      }
      None => false,
    }
  }

  /// Apply a failed load for the current page number.
  ///
  /// A failed first page keeps any visible data. A failed later page rolls
  /// the counter back so the same page is retried.
  pub fn apply_error(&mut self, error: SyncError) {
    if self.page == 1 {
      self.is_refreshing = false;
      if self.items.is_empty() {
        self.ui_state = UiState::Error;
      }
      self.load_more_state = LoadMoreState::PullToLoad;
    } else {
      self.page -= 1;
      self.load_more_state = LoadMoreState::Error;
    }
    self.last_error = Some(error);
  }

  /// Whether scrolling to `last_visible_index` should request the next page.
  pub fn should_trigger_load_more(&self, last_visible_index: usize, total_count: usize) -> bool {
    last_visible_index + PREFETCH_DISTANCE >= total_count
      && !matches!(
        self.load_more_state,
        LoadMoreState::Loading | LoadMoreState::NoMore
      )
      && !self.items.is_empty()
  }
}

fn more_state(has_next: bool) -> LoadMoreState {
  if has_next {
    LoadMoreState::PullToLoad
  } else {
    LoadMoreState::NoMore
  }
}
