//! SQLite-backed cache that survives restarts.
#![allow(clippy::cast_possible_wrap)] // SQLite stores i64

use super::{Cache, CacheError};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Rows are capped at `max_entries`; expired rows are dropped on every write.
pub struct SqliteCache {
    db: Mutex<Connection>,
    max_entries: usize,
}

impl SqliteCache {
    pub fn open(path: &Path, max_entries: usize) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Unavailable(format!(
                    "Failed to create cache directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let db = Connection::open(path)?;
        Self::init(db, max_entries)
    }

    pub fn open_in_memory(max_entries: usize) -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?, max_entries)
    }

    fn init(db: Connection, max_entries: usize) -> Result<Self, CacheError> {
        db.execute_batch(
            r"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS cache_entries (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                expires_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
            ",
        )?;
        Ok(Self {
            db: Mutex::new(db),
            max_entries: max_entries.max(1),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
        self.db
            .lock()
            .map_err(|_| CacheError::Unavailable("cache connection poisoned".into()))
    }

    pub fn row_count(&self) -> Result<usize, CacheError> {
        let db = self.lock()?;
        let rows: i64 = db.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(usize::try_from(rows).unwrap_or(0))
    }

    /// Remove every expired row. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        let db = self.lock()?;
        Ok(db.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])?)
    }
}

#[async_trait]
impl Cache for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = chrono::Utc::now().timestamp_millis();
        let db = self.lock()?;
        let value = db
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(ttl_ms);
        let keep = i64::try_from(self.max_entries).unwrap_or(i64::MAX);

        let mut db = self.lock()?;
        let tx = db.transaction()?;
        tx.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])?;
        tx.execute(
            r"
            INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            ",
            params![key, value, expires_at],
        )?;
        tx.execute(
            r"
            DELETE FROM cache_entries WHERE key NOT IN (
                SELECT key FROM cache_entries ORDER BY expires_at DESC LIMIT ?1
            )
            ",
            params![keep],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let db = self.lock()?;
        db.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.purge_expired() {
            tracing::warn!(error = %e, "Failed to purge expired cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_get_del() {
        let cache = SqliteCache::open_in_memory(100).unwrap();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.set("k", "v2", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));

        cache.del("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_rows_are_invisible_and_purged() {
        let cache = SqliteCache::open_in_memory(100).unwrap();
        cache.set("gone", "v", Duration::ZERO).await.unwrap();
        cache.set("kept", "v", Duration::from_secs(60)).await.unwrap();

        assert!(cache.get("gone").await.unwrap().is_none());
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.get("kept").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_rows_do_not_accumulate() {
        let cache = SqliteCache::open_in_memory(100).unwrap();
        for i in 0..500 {
            cache.set(&format!("k{i}"), "v", Duration::ZERO).await.unwrap();
        }
        assert!(cache.row_count().unwrap() <= 1);
    }

    #[tokio::test]
    async fn test_row_count_capped_soonest_expiry_evicted() {
        let cache = SqliteCache::open_in_memory(3).unwrap();
        cache.set("short", "v", Duration::from_secs(10)).await.unwrap();
        for key in ["a", "b", "c"] {
            cache.set(key, "v", Duration::from_secs(600)).await.unwrap();
        }
        assert_eq!(cache.row_count().unwrap(), 3);
        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        {
            let cache = SqliteCache::open(&path, 100).unwrap();
            cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        }
        let cache = SqliteCache::open(&path, 100).unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
