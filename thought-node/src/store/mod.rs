//! Local store - durable key/value mirror of the ledger log
//!
//! Handles:
//! - The `KvStore` seam (single-key get/put, JSON values)
//! - SQLite persistence for the daemon, an in-memory map for tests
//! - The schema shared by both loops: the cursor and per-index records

pub mod memory;
pub mod sqlite;

use std::str::FromStr;

use alloy_primitives::U256;
use serde_json::Value;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Key holding the highest mirrored index.
pub const CURSOR_KEY: &str = "latestSubmission";

/// Prefix of per-index record keys.
pub const RECORD_PREFIX: &str = "submission-";

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-key durable key/value store.
///
/// Each call is atomic on its own; nothing spans keys.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// Key of the record mirroring ledger entry `index`.
pub fn record_key(index: u64) -> String {
    format!("{}{}", RECORD_PREFIX, index)
}

/// JSON form of a record word: a number when it fits u64, else a decimal string.
fn word_value(word: &U256) -> Value {
    match u64::try_from(*word) {
        Ok(small) => Value::from(small),
        Err(_) => Value::from(word.to_string()),
    }
}

fn value_word(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => U256::from_str(s).ok(),
        _ => None,
    }
}

/// Typed access to the mirror schema on top of any `KvStore`.
pub struct Mirror<'a> {
    store: &'a dyn KvStore,
}

impl<'a> Mirror<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// Seed a brand-new store with cursor 0 and an empty record 0.
    ///
    /// Returns true if seeding happened. An existing cursor is left alone.
    pub fn initialize(&self) -> Result<bool, StoreError> {
        if self.store.get(CURSOR_KEY)?.is_some() {
            return Ok(false);
        }
        self.put_record(0, &[])?;
        self.store.put(CURSOR_KEY, &Value::from(0u64))?;
        Ok(true)
    }

    /// Highest mirrored index; `None` on an uninitialized store.
    pub fn cursor(&self) -> Result<Option<u64>, StoreError> {
        match self.store.get(CURSOR_KEY)? {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| StoreError::Corrupt {
                key: CURSOR_KEY.to_string(),
                reason: format!("expected unsigned integer, got {}", value),
            }),
        }
    }

    /// Cursor, treating an uninitialized store as 0.
    pub fn cursor_or_zero(&self) -> Result<u64, StoreError> {
        Ok(self.cursor()?.unwrap_or(0))
    }

    pub fn set_cursor(&self, index: u64) -> Result<(), StoreError> {
        self.store.put(CURSOR_KEY, &Value::from(index))
    }

    /// Words recorded for `index`, if mirrored.
    pub fn record(&self, index: u64) -> Result<Option<Vec<U256>>, StoreError> {
        let key = record_key(index);
        let Some(value) = self.store.get(&key)? else {
            return Ok(None);
        };
        let Value::Array(items) = &value else {
            return Err(StoreError::Corrupt {
                key,
                reason: format!("expected array, got {}", value),
            });
        };
        items
            .iter()
            .map(|item| {
                value_word(item).ok_or_else(|| StoreError::Corrupt {
                    key: key.clone(),
                    reason: format!("invalid word {}", item),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    pub fn put_record(&self, index: u64, words: &[U256]) -> Result<(), StoreError> {
        let value = Value::Array(words.iter().map(word_value).collect());
        self.store.put(&record_key(index), &value)
    }

    /// Persist a mirrored entry: record first, then the cursor.
    ///
    /// A crash between the two writes leaves the cursor at `index - 1`, so
    /// the next step re-reads `index` and rewrites the same record.
    pub fn advance(&self, index: u64, words: &[U256]) -> Result<(), StoreError> {
        self.put_record(index, words)?;
        self.set_cursor(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::widen;

    #[test]
    fn test_record_key_format() {
        assert_eq!(record_key(0), "submission-0");
        assert_eq!(record_key(42), "submission-42");
    }

    #[test]
    fn test_initialize_seeds_once() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);

        assert_eq!(mirror.cursor().unwrap(), None);
        assert!(mirror.initialize().unwrap());
        assert_eq!(mirror.cursor().unwrap(), Some(0));
        assert_eq!(mirror.record(0).unwrap(), Some(vec![]));

        mirror.advance(1, &widen(&[3, 4])).unwrap();
        assert!(!mirror.initialize().unwrap());
        assert_eq!(mirror.cursor().unwrap(), Some(1));
    }

    #[test]
    fn test_corrupt_cursor_is_reported() {
        let store = MemoryStore::new();
        store.put(CURSOR_KEY, &Value::from("seven")).unwrap();
        let err = Mirror::new(&store).cursor().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_advance_writes_record_and_cursor() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);
        mirror.initialize().unwrap();

        mirror.advance(1, &widen(&[9, 8, 7])).unwrap();
        assert_eq!(mirror.cursor().unwrap(), Some(1));
        assert_eq!(mirror.record(1).unwrap(), Some(widen(&[9, 8, 7])));
        assert_eq!(mirror.record(2).unwrap(), None);
        assert_eq!(store.get("submission-1").unwrap(), Some(serde_json::json!([9, 8, 7])));
    }

    #[test]
    fn test_wide_words_survive_the_store() {
        let store = MemoryStore::new();
        let mirror = Mirror::new(&store);
        let words = vec![U256::from(3u64), U256::from(1u64 << 32), U256::MAX];

        mirror.advance(1, &words).unwrap();

        assert_eq!(mirror.record(1).unwrap(), Some(words));
        let raw = store.get("submission-1").unwrap().unwrap();
        assert_eq!(raw[1], serde_json::json!(4294967296u64));
        assert!(raw[2].is_string());
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let store = MemoryStore::new();
        store.put("submission-1", &serde_json::json!([1, "x"])).unwrap();
        let err = Mirror::new(&store).record(1).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
