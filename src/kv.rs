//! Durable key-value store with a lifecycle independent from the entity cache.
//!
//! Holds small string values (the mirrored user id, the session snapshot) that
//! must survive session resets and cache purges.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{SyncError, SyncResult};

/// Key under which the last known user id is mirrored.
pub const USER_ID_KEY: &str = "session.user_id";

/// Key under which the serialized session is persisted.
pub const SESSION_KEY: &str = "session.snapshot";

/// Trait for durable key-value backends.
pub trait DurableKv: Send + Sync {
  fn get(&self, key: &str) -> SyncResult<Option<String>>;

  fn put(&self, key: &str, value: &str) -> SyncResult<()>;

  fn remove(&self, key: &str) -> SyncResult<()>;
}

/// Shared handle to a durable store.
pub type SharedKv = Arc<dyn DurableKv>;

/// Read a key on the blocking pool.
pub async fn get_blocking(kv: &SharedKv, key: &str) -> SyncResult<Option<String>> {
  let kv = Arc::clone(kv);
  let key = key.to_string();
  tokio::task::spawn_blocking(move || kv.get(&key))
    .await
    .map_err(|e| SyncError::storage("kv task failed", e))?
}

/// Write a key on the blocking pool.
pub async fn put_blocking(kv: &SharedKv, key: &str, value: String) -> SyncResult<()> {
  let kv = Arc::clone(kv);
  let key = key.to_string();
  tokio::task::spawn_blocking(move || kv.put(&key, &value))
    .await
    .map_err(|e| SyncError::storage("kv task failed", e))?
}

/// Remove a key on the blocking pool.
pub async fn remove_blocking(kv: &SharedKv, key: &str) -> SyncResult<()> {
  let kv = Arc::clone(kv);
  let key = key.to_string();
  tokio::task::spawn_blocking(move || kv.remove(&key))
    .await
    .map_err(|e| SyncError::storage("kv task failed", e))?
}

/// In-process store, used in tests and when no data directory is available.
#[derive(Default)]
pub struct MemoryKv {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
  pub fn new() -> Self {
    Self::default()
  }
}

impl DurableKv for MemoryKv {
  fn get(&self, key: &str) -> SyncResult<Option<String>> {
    let values = self
      .values
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    Ok(values.get(key).cloned())
  }

  fn put(&self, key: &str, value: &str) -> SyncResult<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    values.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> SyncResult<()> {
    let mut values = self
      .values
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    values.remove(key);
    Ok(())
  }
}

/// SQLite-backed store kept in its own database file.
pub struct SqliteKv {
  conn: Mutex<Connection>,
}

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl SqliteKv {
  pub fn open(path: &Path) -> SyncResult<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| SyncError::storage("Failed to create kv directory", e))?;
    }
    let conn = Connection::open(path).map_err(|e| {
      SyncError::storage(&format!("Failed to open kv database at {}", path.display()), e)
    })?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> SyncResult<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| SyncError::storage("Failed to open in-memory kv", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> SyncResult<Self> {
    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| SyncError::storage("Failed to run kv migrations", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

impl DurableKv for SqliteKv {
  fn get(&self, key: &str) -> SyncResult<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    conn
      .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| SyncError::storage("Failed to read kv", e))
  }

  fn put(&self, key: &str, value: &str) -> SyncResult<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    conn
      .execute(
        "INSERT INTO kv (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
      )
      .map_err(|e| SyncError::storage("Failed to write kv", e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> SyncResult<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    conn
      .execute("DELETE FROM kv WHERE key = ?", params![key])
      .map_err(|e| SyncError::storage("Failed to delete kv", e))?;
    Ok(())
  }
}
