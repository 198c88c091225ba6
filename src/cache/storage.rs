//! Local store trait with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CachedEntity, Cacheable};
use crate::error::{SyncError, SyncResult};

/// Trait for local cache backends.
///
/// Every operation is atomic per key. Calls block, so the cache layer runs
/// them on the blocking pool.
pub trait LocalStore: Send + Sync + 'static {
  /// Get a single entry by key.
  fn get<T: Cacheable>(&self, key: &str) -> SyncResult<Option<CachedEntity<T>>>;

  /// Insert or overwrite an entry.
  fn upsert<T: Cacheable>(&self, key: &str, value: &T) -> SyncResult<()>;

  /// Delete an entry if present.
  fn delete<T: Cacheable>(&self, key: &str) -> SyncResult<()>;

  /// The oldest entry of this type still in the store.
  fn first_record<T: Cacheable>(&self) -> SyncResult<Option<CachedEntity<T>>>;

  /// Delete every entry of every type.
  fn purge(&self) -> SyncResult<()>;
}

fn encode<T: Cacheable>(value: &T) -> SyncResult<Vec<u8>> {
  serde_json::to_vec(value).map_err(|e| SyncError::storage("Failed to serialize entity", e))
}

fn decode<T: Cacheable>(data: &[u8]) -> SyncResult<T> {
  serde_json::from_slice(data).map_err(|e| SyncError::storage("Failed to deserialize entity", e))
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Generic entity cache (stores serialized JSON)
CREATE TABLE IF NOT EXISTS entity_cache (
    entity_type TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    data BLOB NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (entity_type, entity_key)
);
"#;

impl SqliteStorage {
  /// Open or create the cache database at `path`.
  pub fn open(path: &Path) -> SyncResult<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| SyncError::storage("Failed to create cache directory", e))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      SyncError::storage(
        &format!("Failed to open cache database at {}", path.display()),
        e,
      )
    })?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> SyncResult<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| SyncError::storage("Failed to open in-memory cache", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> SyncResult<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| SyncError::storage("Failed to run cache migrations", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn row_to_entity<T: Cacheable>(
    key: String,
    data: Vec<u8>,
    last_updated: String,
  ) -> SyncResult<CachedEntity<T>> {
    Ok(CachedEntity {
      key,
      value: decode(&data)?,
      last_updated: parse_datetime(&last_updated)?,
    })
  }
}

impl LocalStore for SqliteStorage {
  fn get<T: Cacheable>(&self, key: &str) -> SyncResult<Option<CachedEntity<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, last_updated FROM entity_cache
         WHERE entity_type = ? AND entity_key = ?",
        params![T::entity_type(), key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| SyncError::storage("Failed to query entity", e))?;

    row
      .map(|(data, last_updated)| Self::row_to_entity(key.to_string(), data, last_updated))
      .transpose()
  }

  fn upsert<T: Cacheable>(&self, key: &str, value: &T) -> SyncResult<()> {
    let data = encode(value)?;
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;

    // ON CONFLICT keeps the rowid, so first_record order survives overwrites
    conn
      .execute(
        "INSERT INTO entity_cache (entity_type, entity_key, data, last_updated)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(entity_type, entity_key)
         DO UPDATE SET data = excluded.data, last_updated = excluded.last_updated",
        params![T::entity_type(), key, data, Utc::now().to_rfc3339()],
      )
      .map_err(|e| SyncError::storage("Failed to store entity", e))?;

    Ok(())
  }

  fn delete<T: Cacheable>(&self, key: &str) -> SyncResult<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    conn
      .execute(
        "DELETE FROM entity_cache WHERE entity_type = ? AND entity_key = ?",
        params![T::entity_type(), key],
      )
      .map_err(|e| SyncError::storage("Failed to delete entity", e))?;
    Ok(())
  }

  fn first_record<T: Cacheable>(&self) -> SyncResult<Option<CachedEntity<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;

    let row: Option<(String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT entity_key, data, last_updated FROM entity_cache
         WHERE entity_type = ? ORDER BY rowid LIMIT 1",
        params![T::entity_type()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| SyncError::storage("Failed to scan entities", e))?;

    row
      .map(|(key, data, last_updated)| Self::row_to_entity(key, data, last_updated))
      .transpose()
  }

  fn purge(&self) -> SyncResult<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    conn
      .execute("DELETE FROM entity_cache", [])
      .map_err(|e| SyncError::storage("Failed to purge cache", e))?;
    Ok(())
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> SyncResult<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| SyncError::storage(&format!("Failed to parse datetime '{}'", s), e))
}

struct MemoryEntry {
  data: Vec<u8>,
  last_updated: DateTime<Utc>,
  seq: u64,
}

#[derive(Default)]
struct MemoryInner {
  entries: HashMap<(&'static str, String), MemoryEntry>,
  next_seq: u64,
}

/// In-process store. Not durable; used by tests and as a fallback.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl LocalStore for MemoryStorage {
  fn get<T: Cacheable>(&self, key: &str) -> SyncResult<Option<CachedEntity<T>>> {
    let inner = self
      .inner
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;

    inner
      .entries
      .get(&(T::entity_type(), key.to_string()))
      .map(|entry| {
        Ok(CachedEntity {
          key: key.to_string(),
          value: decode(&entry.data)?,
          last_updated: entry.last_updated,
        })
      })
      .transpose()
  }

  fn upsert<T: Cacheable>(&self, key: &str, value: &T) -> SyncResult<()> {
    let data = encode(value)?;
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;

    let seq = inner.next_seq;
    let entry = inner
      .entries
      .entry((T::entity_type(), key.to_string()))
      .or_insert(MemoryEntry {
        data: Vec::new(),
        last_updated: Utc::now(),
        seq,
      });
    entry.data = data;
    entry.last_updated = Utc::now();
    let inserted = entry.seq == seq;
    if inserted {
      inner.next_seq += 1;
    }
    Ok(())
  }

  fn delete<T: Cacheable>(&self, key: &str) -> SyncResult<()> {
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    inner.entries.remove(&(T::entity_type(), key.to_string()));
    Ok(())
  }

  fn first_record<T: Cacheable>(&self) -> SyncResult<Option<CachedEntity<T>>> {
    let inner = self
      .inner
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;

    inner
      .entries
      .iter()
      .filter(|((entity_type, _), _)| *entity_type == T::entity_type())
      .min_by_key(|(_, entry)| entry.seq)
      .map(|((_, key), entry)| {
        Ok(CachedEntity {
          key: key.clone(),
          value: decode(&entry.data)?,
          last_updated: entry.last_updated,
        })
      })
      .transpose()
  }

  fn purge(&self) -> SyncResult<()> {
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| SyncError::storage("Lock poisoned", e))?;
    inner.entries.clear();
    Ok(())
  }
}
