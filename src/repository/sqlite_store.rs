//! SQLite-backed report cache.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::report_cache::CacheStore;
use super::{is_expired, parse_datetime, Result};
use crate::models::TargetDate;

/// Report cache in a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    max_age: Option<Duration>,
}

impl SqliteStore {
    /// Open (or create) the cache database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL so a reader in another process doesn't block writes
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            max_age: None,
        };
        store.init_tables()?;
        Ok(store)
    }

    /// Treat rows fetched more than `max_age` ago as absent.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_tables(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS report_cache (
                date TEXT PRIMARY KEY,
                html TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// Number of cached reports, expired rows included.
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM report_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn read(&self, key: TargetDate) -> Result<Option<String>> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT html, fetched_at FROM report_cache WHERE date = ?",
                params![key.as_key()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.and_then(|(html, fetched_at)| {
            if is_expired(parse_datetime(&fetched_at), self.max_age) {
                debug!("Cached report for {} is older than the max age", key);
                None
            } else {
                Some(html)
            }
        }))
    }

    async fn write(&self, key: TargetDate, html: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            r#"INSERT INTO report_cache (date, html, fetched_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(date) DO UPDATE SET
                   html = excluded.html,
                   fetched_at = excluded.fetched_at"#,
            params![key.as_key(), html, now],
        )?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
