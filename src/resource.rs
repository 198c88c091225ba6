//! Tagged load result shared by repositories and list screens.
//!
//! A `Resource<T>` is exactly one of `Loading`, `Success` or `Error`. Consumers
//! dispatch on the variant:
//!
//! ```ignore
//! match resource {
//!     Resource::Loading => render_spinner(),
//!     Resource::Success(data) => render_data(data),
//!     Resource::Error(e) => render_error(e),
//! }
//! ```

use crate::error::{SyncError, SyncResult};

/// The state of a load
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
  /// Data is being fetched
  Loading,
  /// Load completed successfully
  Success(T),
  /// Load failed
  Error(SyncError),
}

impl<T> Resource<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, Resource::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Resource::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Resource::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      Resource::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&SyncError> {
    match self {
      Resource::Error(e) => Some(e),
      _ => None,
    }
  }

  pub fn into_data(self) -> Option<T> {
    match self {
      Resource::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
    match self {
      Resource::Loading => Resource::Loading,
      Resource::Success(data) => Resource::Success(f(data)),
      Resource::Error(e) => Resource::Error(e),
    }
  }
}

impl<T> From<SyncResult<T>> for Resource<T> {
  fn from(result: SyncResult<T>) -> Self {
    match result {
      Ok(data) => Resource::Success(data),
      Err(e) => Resource::Error(e),
    }
  }
}
