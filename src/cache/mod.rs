//! Volatile key/value cache for generation results.
//!
//! The cache is an accelerator only. Callers treat every [`CacheError`] as a
//! miss, and a cache that cannot be opened at startup means running without
//! one.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::config::{CacheBackend, CacheConfig};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Release resources at shutdown.
    async fn close(&self) {}
}

/// Open the configured backend. Failures are logged and yield `None`.
pub fn connect(config: &CacheConfig, sqlite_path: &Path) -> Option<Arc<dyn Cache>> {
    match config.backend {
        CacheBackend::None => {
            info!("Generation cache disabled");
            None
        }
        CacheBackend::Memory => {
            info!(max_entries = config.max_entries, "Using in-memory generation cache");
            Some(Arc::new(MemoryCache::new(config.max_entries)))
        }
        CacheBackend::Sqlite => match SqliteCache::open(sqlite_path, config.max_entries) {
            Ok(cache) => {
                info!(path = %sqlite_path.display(), "Using SQLite generation cache");
                Some(Arc::new(cache))
            }
            Err(e) => {
                warn!(error = %e, "Cache unavailable, continuing without it");
                None
            }
        },
    }
}
