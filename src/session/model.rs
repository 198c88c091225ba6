use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Tokens are refreshed this long before they actually expire.
pub const REFRESH_WINDOW_MS: i64 = 15 * 60 * 1000;

/// Token data returned by login and token refresh endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
  pub token: String,
  pub refresh_token: String,
  /// Access token lifetime in seconds
  pub expire: i64,
  /// Refresh token lifetime in seconds
  pub refresh_expire: i64,
}

/// The authenticated session. `Session::default()` is the logged-out session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub user_id: i64,
  pub token: String,
  pub refresh_token: String,
  pub is_logged_in: bool,
  /// Seconds
  pub expire: i64,
  /// Seconds
  pub refresh_expire: i64,
  /// Epoch milliseconds
  pub created_at: i64,
}

pub(crate) fn now_ms() -> i64 {
  Utc::now().timestamp_millis()
}

impl Session {
  pub fn new(tokens: AuthTokens, user_id: i64, created_at: i64) -> Self {
    Self {
      user_id,
      token: tokens.token,
      refresh_token: tokens.refresh_token,
      is_logged_in: true,
      expire: tokens.expire,
      refresh_expire: tokens.refresh_expire,
      created_at,
    }
  }

  /// The logged-out session
  pub fn empty() -> Self {
    Self::default()
  }

  /// User id if it is usable as a subject key.
  pub fn subject_id(&self) -> Option<i64> {
    (self.user_id > 0).then_some(self.user_id)
  }

  pub fn is_token_expired(&self) -> bool {
    self.is_token_expired_at(now_ms())
  }

  pub fn is_token_expired_at(&self, now: i64) -> bool {
    self.token.is_empty() || now >= self.created_at + self.expire * 1000
  }

  pub fn is_refresh_token_expired(&self) -> bool {
    self.is_refresh_token_expired_at(now_ms())
  }

  pub fn is_refresh_token_expired_at(&self, now: i64) -> bool {
    self.refresh_token.is_empty() || now >= self.created_at + self.refresh_expire * 1000
  }

  pub fn should_refresh(&self) -> bool {
    self.should_refresh_at(now_ms())
  }

  pub fn should_refresh_at(&self, now: i64) -> bool {
    now >= self.created_at + self.expire * 1000 - REFRESH_WINDOW_MS
      && !self.is_refresh_token_expired_at(now)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn session(expire: i64, refresh_expire: i64) -> Session {
    Session::new(
      AuthTokens {
        token: "access".into(),
        refresh_token: "refresh".into(),
        expire,
        refresh_expire,
      },
      9,
      1_000_000,
    )
  }

  #[test]
  fn test_token_expiry_boundary() {
    let s = session(60, 3600);
    assert!(!s.is_token_expired_at(1_000_000 + 59_999));
    assert!(s.is_token_expired_at(1_000_000 + 60_000));
    assert!(s.is_token_expired_at(1_000_000 + 60_001));
  }

  #[test]
  fn test_empty_token_is_always_expired() {
    let mut s = session(3600, 3600);
    s.token.clear();
    assert!(s.is_token_expired_at(0));
    assert!(s.is_token_expired_at(1_000_000));
    assert!(Session::empty().is_token_expired());
  }

  #[test]
  fn test_should_refresh_inside_window() {
    // 1 hour token, refresh window opens at 45 minutes
    let s = session(3600, 7200);
    let opens = 1_000_000 + 3_600_000 - REFRESH_WINDOW_MS;
    assert!(!s.should_refresh_at(opens - 1));
    assert!(s.should_refresh_at(opens));
  }

  #[test]
  fn test_should_not_refresh_with_expired_refresh_token() {
    let s = session(3600, 3600);
    assert!(!s.should_refresh_at(1_000_000 + 3_600_000));
  }

  #[test]
  fn test_subject_id() {
    assert_eq!(session(1, 1).subject_id(), Some(9));
    assert_eq!(Session::empty().subject_id(), None);
  }
}
