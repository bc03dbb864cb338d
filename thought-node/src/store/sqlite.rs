//! SQLite-backed key/value store.
//!
//! Values are stored as JSON text in a single table. WAL mode lets the
//! generation loop read while the synchronizer writes.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use super::{KvStore, StoreError};

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create `mirror.db` inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("mirror.db");
        let db = Connection::open(&db_path)?;

        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )?;

        info!(path = %db_path.display(), "Local store opened");

        Ok(Self { db: Mutex::new(db) })
    }

    /// Number of mirrored records (keys with the record prefix).
    pub fn record_count(&self) -> Result<u64, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let count: i64 = db.query_row(
            "SELECT count(*) FROM kv WHERE key LIKE ?1",
            [format!("{}%", super::RECORD_PREFIX)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = db.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let raw: Option<String> = stmt.query_row([key], |row| row.get(0)).optional()?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let text = value.to_string();
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        db.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
            rusqlite::params![key, text],
        )?;
        debug!(key, bytes = text.len(), "Stored value");
        Ok(())
    }
}
