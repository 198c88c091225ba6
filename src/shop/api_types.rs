//! Serde-deserializable types matching the shop API wire format.
//!
//! Every endpoint answers with an envelope `{ "code": 0, "data": ..., "msg": ... }`
//! where `code == 0` means success.

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  pub code: i64,
  pub data: Option<T>,
  pub msg: Option<String>,
}

/// Outcome of one network request, as handed to repositories.
///
/// Transport errors and non-zero envelope codes both end up as
/// `succeeded == false` with a message.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
  pub succeeded: bool,
  pub data: Option<T>,
  pub message: Option<String>,
}

impl<T> ApiResponse<T> {
  pub fn ok(data: T) -> Self {
    Self {
      succeeded: true,
      data: Some(data),
      message: None,
    }
  }

  pub fn empty() -> Self {
    Self {
      succeeded: true,
      data: None,
      message: None,
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self {
      succeeded: false,
      data: None,
      message: Some(message.into()),
    }
  }

  /// Payload of a read: a missing body is an error.
  pub fn into_result(self) -> SyncResult<T> {
    if !self.succeeded {
      return Err(self.failure());
    }
    self.data.ok_or(SyncError::EmptyPayload)
  }

  /// Outcome of a write: only the success flag matters.
  pub fn into_unit(self) -> SyncResult<()> {
    if self.succeeded {
      Ok(())
    } else {
      Err(self.failure())
    }
  }

  fn failure(&self) -> SyncError {
    SyncError::NetworkFailure(
      self
        .message
        .clone()
        .unwrap_or_else(|| "request failed".to_string()),
    )
  }
}

impl<T> From<ApiEnvelope<T>> for ApiResponse<T> {
  fn from(envelope: ApiEnvelope<T>) -> Self {
    Self {
      succeeded: envelope.code == 0,
      data: envelope.data,
      message: envelope.msg,
    }
  }
}

/// Body of the nickname/avatar update endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProfileUpdate<'a> {
  pub nickname: &'a str,
  pub avatar: Option<&'a str>,
  pub gender: Option<u8>,
}

/// Body of the token refresh endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRefreshRequest<'a> {
  pub refresh_token: &'a str,
}
