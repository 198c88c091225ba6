//! Scripted `ShopApi` for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::session::AuthTokens;
use crate::shop::api_types::ApiResponse;
use crate::shop::client::ShopApi;
use crate::shop::types::{Conversation, Footprint, Page, UserProfile};

pub(crate) struct FakeApi {
  profile: Mutex<ApiResponse<UserProfile>>,
  update: Mutex<ApiResponse<()>>,
  refresh: Mutex<ApiResponse<AuthTokens>>,
  footprints: Mutex<HashMap<u32, ApiResponse<Page<Footprint>>>>,
  conversations: Mutex<HashMap<u32, ApiResponse<Page<Conversation>>>>,
  updated: Mutex<Vec<String>>,
  profile_calls: AtomicU32,
  refresh_calls: AtomicU32,
}

impl Default for FakeApi {
  fn default() -> Self {
    Self {
      profile: Mutex::new(ApiResponse::failed("no profile scripted")),
      update: Mutex::new(ApiResponse::empty()),
      refresh: Mutex::new(ApiResponse::failed("no refresh scripted")),
      footprints: Mutex::new(HashMap::new()),
      conversations: Mutex::new(HashMap::new()),
      updated: Mutex::new(Vec::new()),
      profile_calls: AtomicU32::new(0),
      refresh_calls: AtomicU32::new(0),
    }
  }
}

impl FakeApi {
  pub fn set_profile(&self, response: ApiResponse<UserProfile>) {
    *self.profile.lock().unwrap() = response;
  }

  pub fn set_update(&self, response: ApiResponse<()>) {
    *self.update.lock().unwrap() = response;
  }

  pub fn set_refresh(&self, response: ApiResponse<AuthTokens>) {
    *self.refresh.lock().unwrap() = response;
  }

  pub fn set_footprints(&self, page: u32, response: ApiResponse<Page<Footprint>>) {
    self.footprints.lock().unwrap().insert(page, response);
  }

  pub fn set_conversations(&self, page: u32, response: ApiResponse<Page<Conversation>>) {
    self.conversations.lock().unwrap().insert(page, response);
  }

  pub fn updated_nicknames(&self) -> Vec<String> {
    self.updated.lock().unwrap().clone()
  }

  pub fn profile_calls(&self) -> u32 {
    self.profile_calls.load(Ordering::SeqCst)
  }

  pub fn refresh_calls(&self) -> u32 {
    self.refresh_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ShopApi for FakeApi {
  async fn fetch_profile(&self) -> ApiResponse<UserProfile> {
    self.profile_calls.fetch_add(1, Ordering::SeqCst);
    self.profile.lock().unwrap().clone()
  }

  async fn update_profile(&self, profile: &UserProfile) -> ApiResponse<()> {
    self.updated.lock().unwrap().push(profile.nickname.clone());
    self.update.lock().unwrap().clone()
  }

  async fn refresh_token(&self, _refresh_token: &str) -> ApiResponse<AuthTokens> {
    self.refresh_calls.fetch_add(1, Ordering::SeqCst);
    self.refresh.lock().unwrap().clone()
  }

  async fn fetch_footprints(&self, page: u32, _size: u32) -> ApiResponse<Page<Footprint>> {
    self
      .footprints
      .lock()
      .unwrap()
      .get(&page)
      .cloned()
      .unwrap_or_else(|| ApiResponse::failed("no page scripted"))
  }

  async fn fetch_conversations(&self, page: u32, _size: u32) -> ApiResponse<Page<Conversation>> {
    self
      .conversations
      .lock()
      .unwrap()
      .get(&page)
      .cloned()
      .unwrap_or_else(|| ApiResponse::failed("no page scripted"))
  }
}
