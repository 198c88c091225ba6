use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheLayer, LocalStore};
use crate::error::SyncResult;
use crate::session::{AuthTokens, SessionStore};
use crate::shop::client::ShopApi;

/// Session lifecycle: login, token refresh and logout.
pub struct AccountRepository<A: ShopApi, S: LocalStore> {
  api: Arc<A>,
  cache: CacheLayer<S>,
  session: SessionStore,
}

impl<A: ShopApi, S: LocalStore> AccountRepository<A, S> {
  pub fn new(api: Arc<A>, cache: CacheLayer<S>, session: SessionStore) -> Self {
    Self {
      api,
      cache,
      session,
    }
  }

  /// Store the tokens of a completed login.
  pub async fn login(&self, tokens: AuthTokens, user_id: i64) -> SyncResult<()> {
    self.session.save(tokens, user_id).await
  }

  /// Refresh the access token when it is inside the refresh window.
  ///
  /// Returns whether a refresh happened.
  pub async fn ensure_fresh_token(&self) -> SyncResult<bool> {
    let session = self.session.get();
    if !session.is_logged_in || !session.should_refresh() {
      return Ok(false);
    }

    let tokens = self
      .api
      .refresh_token(&session.refresh_token)
      .await
      .into_result()?;
    self
      .session
      .update_token(
        tokens.token,
        tokens.refresh_token,
        tokens.expire,
        tokens.refresh_expire,
      )
      .await?;
    info!(user_id = session.user_id, "Access token refreshed");
    Ok(true)
  }

  /// Reset the session and drop every cached entity.
  pub async fn logout(&self) -> SyncResult<()> {
    self.session.clear().await?;
    self.cache.purge().await?;
    info!("Logged out, cache purged");
    Ok(())
  }
}
