//! Error taxonomy for the sync core.

use thiserror::Error;

/// Errors surfaced by repositories, the identity resolver and the stores.
///
/// Lost updates between two writers of the same key are not represented here:
/// the optimistic writer serializes cache mutations per key so they cannot happen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
  /// The network client reported a failed request
  #[error("Network failure: {0}")]
  NetworkFailure(String),

  /// The request succeeded but carried no body
  #[error("Server returned an empty payload")]
  EmptyPayload,

  /// No identity tier produced a usable subject id
  #[error("Could not resolve a subject id from any source")]
  IdentityUnresolved,

  /// Local store or durable key-value store failure
  #[error("Storage error: {0}")]
  Storage(String),
}

impl SyncError {
  pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
    SyncError::Storage(format!("{}: {}", context, err))
  }
}

/// Type alias for Result with SyncError
pub type SyncResult<T> = Result<T, SyncError>;
