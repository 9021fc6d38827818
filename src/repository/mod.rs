//! Report cache persistence.
//!
//! `ReportCache` is the façade the fetcher talks to; the storage itself is
//! any `CacheStore`:
//! - `MemoryStore`: process-lifetime map
//! - `FileStore`: one HTML file per date
//! - `SqliteStore`: a single SQLite table

mod file_store;
mod report_cache;
mod sqlite_store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use file_store::FileStore;
pub use report_cache::{CacheStore, MemoryStore, ReportCache};
pub use sqlite_store::SqliteStore;

use crate::config::CacheBackend;

/// Errors raised by cache storage backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Parse a stored RFC 3339 timestamp, falling back to the epoch.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Whether an entry written at `fetched_at` is older than `max_age`.
pub(crate) fn is_expired(fetched_at: DateTime<Utc>, max_age: Option<Duration>) -> bool {
    let Some(max_age) = max_age else {
        return false;
    };
    let age = Utc::now().signed_duration_since(fetched_at);
    age.to_std().map(|age| age > max_age).unwrap_or(false)
}

/// Open the store for a configured backend. `dir` holds the files or the
/// database; it is ignored by the memory backend.
pub fn open_store(
    backend: CacheBackend,
    dir: &Path,
    max_age: Option<Duration>,
) -> Result<Arc<dyn CacheStore>> {
    Ok(match backend {
        CacheBackend::Memory => Arc::new(MemoryStore::default()),
        CacheBackend::File => Arc::new(FileStore::new(dir)?.with_max_age(max_age)),
        CacheBackend::Sqlite => {
            std::fs::create_dir_all(dir)?;
            Arc::new(SqliteStore::open(&dir.join("report_cache.db"))?.with_max_age(max_age))
        }
    })
}
