use futures::stream::{self, Stream};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::model::{now_ms, AuthTokens, Session};
use crate::error::{SyncError, SyncResult};
use crate::kv::{self, SharedKv, SESSION_KEY, USER_ID_KEY};

/// Single source of truth for login state.
///
/// Holds exactly one `Session` in a watch channel: every mutation swaps or
/// patches the whole value under the channel's lock, so readers never see a
/// half-updated session. Clones share the same state.
///
/// Mutations update the in-memory value first and then persist the snapshot
/// to the durable store. Both steps run under one write lock, so snapshots
/// reach the durable store in the same order as the in-memory updates. If
/// persisting fails the in-memory value stays authoritative and the error is
/// returned to the caller.
#[derive(Clone)]
pub struct SessionStore {
  tx: Arc<watch::Sender<Session>>,
  kv: SharedKv,
  write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
  /// Create a store holding the empty session.
  pub fn new(kv: SharedKv) -> Self {
    let (tx, _rx) = watch::channel(Session::empty());
    Self {
      tx: Arc::new(tx),
      kv,
      write_lock: Arc::new(Mutex::new(())),
    }
  }

  /// Create a store seeded from the persisted snapshot, if any.
  pub async fn restore(kv: SharedKv) -> SyncResult<Self> {
    let store = Self::new(Arc::clone(&kv));
    if let Some(raw) = kv::get_blocking(&kv, SESSION_KEY).await? {
      match serde_json::from_str::<Session>(&raw) {
        Ok(session) => {
          info!(user_id = session.user_id, "Restored persisted session");
          store.tx.send_replace(session);
        }
        Err(e) => warn!(error = %e, "Discarding unreadable session snapshot"),
      }
    }
    Ok(store)
  }

  /// Current session snapshot.
  pub fn get(&self) -> Session {
    self.tx.borrow().clone()
  }

  /// Subscribe to session changes. The receiver starts at the latest value.
  pub fn subscribe(&self) -> watch::Receiver<Session> {
    self.tx.subscribe()
  }

  /// Stream of session values, replaying the latest one first.
  pub fn observe(&self) -> impl Stream<Item = Session> + Send + 'static {
    let rx = self.tx.subscribe();
    stream::unfold((rx, true), |(mut rx, first)| async move {
      if !first && rx.changed().await.is_err() {
        return None;
      }
      let session = rx.borrow_and_update().clone();
      Some((session, (rx, false)))
    })
  }

  /// Replace the session with one built from fresh tokens.
  pub async fn save(&self, tokens: AuthTokens, user_id: i64) -> SyncResult<()> {
    let _guard = self.write_lock.lock().await;
    let session = Session::new(tokens, user_id, now_ms());
    self.tx.send_replace(session.clone());
    info!(user_id, "Session saved");

    if user_id > 0 {
      kv::put_blocking(&self.kv, USER_ID_KEY, user_id.to_string()).await?;
    }
    self.persist(&session).await
  }

  /// Patch token fields, keeping user id and login flag.
  ///
  /// Ignored when nobody is logged in, so a refresh finishing after logout
  /// cannot revive the session.
  pub async fn update_token(
    &self,
    token: String,
    refresh_token: String,
    expire: i64,
    refresh_expire: i64,
  ) -> SyncResult<()> {
    let _guard = self.write_lock.lock().await;
    let updated = self.tx.send_if_modified(|session| {
      if !session.is_logged_in {
        return false;
      }
      session.token = token;
      session.refresh_token = refresh_token;
      session.expire = expire;
      session.refresh_expire = refresh_expire;
      session.created_at = now_ms();
      true
    });
    if !updated {
      debug!("No active session, token update ignored");
      return Ok(());
    }
    debug!("Session tokens updated");

    let session = self.get();
    self.persist(&session).await
  }

  /// Reset to the empty session.
  ///
  /// The mirrored user id in the durable store is left in place.
  pub async fn clear(&self) -> SyncResult<()> {
    let _guard = self.write_lock.lock().await;
    self.tx.send_replace(Session::empty());
    info!("Session cleared");
    kv::remove_blocking(&self.kv, SESSION_KEY).await
  }

  async fn persist(&self, session: &Session) -> SyncResult<()> {
    let raw = serde_json::to_string(session)
      .map_err(|e| SyncError::storage("Failed to serialize session", e))?;
    kv::put_blocking(&self.kv, SESSION_KEY, raw).await
  }
}
