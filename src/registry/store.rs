//! Cache store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

use crate::http::StoredResponse;

/// A stored response plus the moment it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub response: StoredResponse,
  pub stored_at: DateTime<Utc>,
}

/// Trait for persistent key-value cache backends.
///
/// One entry per identity per namespace; `put` overwrites. No locking is
/// provided beyond the backend's own per-call atomicity, so concurrent
/// put/get on the same identity is last-write-wins.
pub trait CacheStore: Send + Sync {
  /// Create the namespace if it does not exist yet. Idempotent.
  fn ensure_namespace(&self, name: &str) -> Result<()>;

  /// Look up an entry by identity.
  fn get(&self, namespace: &str, identity: &str) -> Result<Option<CacheEntry>>;

  /// Store (or overwrite) an entry.
  fn put(&self, namespace: &str, identity: &str, response: &StoredResponse) -> Result<()>;

  /// Remove a single entry. Removing an absent entry is not an error.
  fn delete(&self, namespace: &str, identity: &str) -> Result<()>;

  /// Remove a namespace and every entry in it.
  fn delete_namespace(&self, name: &str) -> Result<()>;

  /// Names of all namespaces that exist or hold entries.
  fn list_namespaces(&self) -> Result<Vec<String>>;

  /// Number of entries in a namespace.
  fn count_entries(&self, namespace: &str) -> Result<u64>;
}

/// SQLite-backed cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store. Used by tests and throwaway engines.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("inkcache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per request identity per namespace. The identity is hashed for a
-- stable fixed-length key; the raw identity is kept for inspection.
CREATE TABLE IF NOT EXISTS entries (
    namespace TEXT NOT NULL,
    identity_hash TEXT NOT NULL,
    identity TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace, identity_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_namespace ON entries(namespace);
"#;

impl CacheStore for SqliteStore {
  fn ensure_namespace(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO namespaces (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to create namespace {}: {}", name, e))?;

    Ok(())
  }

  fn get(&self, namespace: &str, identity: &str) -> Result<Option<CacheEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, stored_at FROM entries
         WHERE namespace = ? AND identity_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![namespace, identity_key(identity)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers, body, stored_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_slice(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let stored_at = parse_datetime(&stored_at_str)?;
        Ok(Some(CacheEntry {
          response: StoredResponse {
            status,
            headers,
            body,
          },
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, namespace: &str, identity: &str, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_vec(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (namespace, identity_hash, identity, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          namespace,
          identity_key(identity),
          identity,
          response.status,
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn delete(&self, namespace: &str, identity: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM entries WHERE namespace = ? AND identity_hash = ?",
        params![namespace, identity_key(identity)],
      )
      .map_err(|e| eyre!("Failed to delete entry: {}", e))?;

    Ok(())
  }

  fn delete_namespace(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE namespace = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    conn
      .execute("DELETE FROM namespaces WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", name, e))?;

    Ok(())
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Union with entries so namespaces written to without an explicit open
    // are still visible to eviction.
    let mut stmt = conn
      .prepare(
        "SELECT name FROM namespaces
         UNION SELECT DISTINCT namespace FROM entries
         ORDER BY 1",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn count_entries(&self, namespace: &str) -> Result<u64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE namespace = ?",
        params![namespace],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;

    Ok(count as u64)
  }
}

/// SHA256 hash of an identity for a stable, fixed-length key.
fn identity_key(identity: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(identity.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
