use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::session::{AuthTokens, SessionStore};
use crate::shop::api_types::{ApiEnvelope, ApiProfileUpdate, ApiRefreshRequest, ApiResponse};
use crate::shop::types::{Conversation, Footprint, Page, UserProfile};

/// Network collaborator used by the repositories.
///
/// Implementations report failures through `ApiResponse` and do not retry.
#[async_trait]
pub trait ShopApi: Send + Sync + 'static {
  async fn fetch_profile(&self) -> ApiResponse<UserProfile>;

  async fn update_profile(&self, profile: &UserProfile) -> ApiResponse<()>;

  async fn refresh_token(&self, refresh_token: &str) -> ApiResponse<AuthTokens>;

  async fn fetch_footprints(&self, page: u32, size: u32) -> ApiResponse<Page<Footprint>>;

  async fn fetch_conversations(&self, page: u32, size: u32) -> ApiResponse<Page<Conversation>>;
}

/// HTTP implementation of `ShopApi`
#[derive(Clone)]
pub struct HttpClient {
  http: reqwest::Client,
  base: Url,
  session: SessionStore,
}

impl HttpClient {
  /// `base_url` should end with a slash so endpoint paths join below it.
  pub fn new(config: &ApiConfig, session: SessionStore) -> Result<Self> {
    let base = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base url {}: {}", config.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      session,
    })
  }

  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResponse<T> {
    self
      .send(self.builder(Method::GET, path).map(|b| b.query(query)))
      .await
  }

  async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResponse<T> {
    self
      .send(self.builder(Method::POST, path).map(|b| b.json(body)))
      .await
  }

  fn builder(
    &self,
    method: Method,
    path: &str,
  ) -> std::result::Result<reqwest::RequestBuilder, String> {
    let url = self
      .base
      .join(path)
      .map_err(|e| format!("Invalid endpoint {}: {}", path, e))?;

    let mut request = self.http.request(method, url);
    let token = self.session.get().token;
    if !token.is_empty() {
      request = request.bearer_auth(token);
    }
    Ok(request)
  }

  async fn send<T: DeserializeOwned>(
    &self,
    request: std::result::Result<reqwest::RequestBuilder, String>,
  ) -> ApiResponse<T> {
    let request = match request {
      Ok(r) => r,
      Err(message) => return ApiResponse::failed(message),
    };

    let response = match request.send().await {
      Ok(r) => r,
      Err(e) => {
        debug!(error = %e, "Request failed");
        return ApiResponse::failed(e.to_string());
      }
    };

    let status = response.status();
    if !status.is_success() {
      return ApiResponse::failed(format!("HTTP {}", status));
    }

    match response.json::<ApiEnvelope<T>>().await {
      Ok(envelope) => envelope.into(),
      Err(e) => ApiResponse::failed(format!("Failed to parse response: {}", e)),
    }
  }
}

fn page_query(page: u32, size: u32) -> [(&'static str, String); 2] {
  [("page", page.to_string()), ("size", size.to_string())]
}

#[async_trait]
impl ShopApi for HttpClient {
  async fn fetch_profile(&self) -> ApiResponse<UserProfile> {
    self.get("user/profile", &[]).await
  }

  async fn update_profile(&self, profile: &UserProfile) -> ApiResponse<()> {
    let body = ApiProfileUpdate {
      nickname: &profile.nickname,
      avatar: profile.avatar.as_deref(),
      gender: profile.gender,
    };
    self.post("user/profile", &body).await
  }

  async fn refresh_token(&self, refresh_token: &str) -> ApiResponse<AuthTokens> {
    self
      .post("auth/refresh", &ApiRefreshRequest { refresh_token })
      .await
  }

  async fn fetch_footprints(&self, page: u32, size: u32) -> ApiResponse<Page<Footprint>> {
    self.get("user/footprints", &page_query(page, size)).await
  }

  async fn fetch_conversations(&self, page: u32, size: u32) -> ApiResponse<Page<Conversation>> {
    self.get("im/conversations", &page_query(page, size)).await
  }
}
