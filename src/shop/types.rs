use serde::{Deserialize, Serialize};

/// Profile of the logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub user_id: i64,
  pub nickname: String,
  pub avatar: Option<String>,
  pub gender: Option<u8>,
  /// Epoch milliseconds of the last local or remote change
  #[serde(default)]
  pub updated_at: i64,
}

impl UserProfile {
  /// Minimal profile used when an optimistic write has nothing cached to patch.
  pub fn placeholder(user_id: i64) -> Self {
    Self {
      user_id,
      nickname: String::new(),
      avatar: None,
      gender: None,
      updated_at: 0,
    }
  }
}

/// Chat conversation summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
  pub id: i64,
  pub peer_name: String,
  pub last_message: Option<String>,
  #[serde(default)]
  pub unread: u32,
  pub updated_at: i64,
}

/// Browsing history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footprint {
  pub id: i64,
  pub goods_id: i64,
  pub goods_name: String,
  /// Price in cents
  pub price: i64,
  pub viewed_at: i64,
}

/// Pagination block of a list response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub page: u32,
  pub size: u32,
  pub total: u64,
}

impl Pagination {
  /// Whether another page exists after this one.
  ///
  /// Assumes a constant page size and no server-side inserts or removals
  /// between page requests.
  pub fn has_next_page(&self) -> bool {
    (self.size as u64) * (self.page as u64) < self.total
  }
}

/// One page of a paged list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub list: Vec<T>,
  pub pagination: Pagination,
}
