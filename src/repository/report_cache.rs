//! Date-keyed cache of report HTML.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::Result;
use crate::models::{ReportDocument, TargetDate};

/// Storage boundary for cached reports. Writes overwrite by key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self, key: TargetDate) -> Result<Option<String>>;

    async fn write(&self, key: TargetDate, html: &str) -> Result<()>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<TargetDate, String>>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: TargetDate) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn write(&self, key: TargetDate, html: &str) -> Result<()> {
        self.entries.write().await.insert(key, html.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Report cache in front of a storage backend.
///
/// Backend failures never fail a fetch: a read error is a miss and a write
/// error is only logged.
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for ReportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportCache")
            .field("store", &self.store.name())
            .finish()
    }
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ReportCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    pub async fn get(&self, date: TargetDate) -> Option<ReportDocument> {
        match self.store.read(date).await {
            Ok(Some(html)) => {
                debug!("Cache hit for {} ({} bytes)", date, html.len());
                Some(ReportDocument::cached(date, html))
            }
            Ok(None) => {
                debug!("Cache miss for {}", date);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {} ({}): {}", date, self.store.name(), e);
                None
            }
        }
    }

    /// Store `document` under its own date.
    pub async fn set(&self, document: &ReportDocument) {
        let date = document.date();
        match self.store.write(date, document.html()).await {
            Ok(()) => info!("Cached report for {}", date),
            Err(e) => warn!("Cache write failed for {} ({}): {}", date, self.store.name(), e),
        }
    }

    pub async fn contains(&self, date: TargetDate) -> bool {
        matches!(self.store.read(date).await, Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentOrigin;
    use crate::repository::CacheError;
    use chrono::NaiveDate;

    fn day(d: u32) -> TargetDate {
        TargetDate::new(NaiveDate::from_ymd_opt(2025, 11, d).unwrap())
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn read(&self, _key: TargetDate) -> Result<Option<String>> {
            Err(CacheError::Io(std::io::Error::other("disk on fire")))
        }

        async fn write(&self, _key: TargetDate, _html: &str) -> Result<()> {
            Err(CacheError::Io(std::io::Error::other("disk on fire")))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_get_set_contains() {
        let cache = ReportCache::in_memory();
        assert!(cache.get(day(4)).await.is_none());
        assert!(!cache.contains(day(4)).await);

        let live = ReportDocument::live(day(4), "<html>4</html>".to_string(), Some(day(4).date()));
        cache.set(&live).await;

        assert!(cache.contains(day(4)).await);
        assert!(!cache.contains(day(5)).await);

        let cached = cache.get(day(4)).await.unwrap();
        assert_eq!(cached.html(), "<html>4</html>");
        assert_eq!(cached.date(), day(4));
        assert_eq!(cached.origin(), DocumentOrigin::Cache);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = ReportCache::in_memory();
        cache
            .set(&ReportDocument::live(day(1), "old".to_string(), None))
            .await;
        cache
            .set(&ReportDocument::live(day(1), "new".to_string(), None))
            .await;
        assert_eq!(cache.get(day(1)).await.unwrap().html(), "new");
    }

    #[tokio::test]
    async fn test_backend_errors_are_misses() {
        let cache = ReportCache::new(Arc::new(BrokenStore));
        cache
            .set(&ReportDocument::live(day(1), "x".to_string(), None))
            .await;
        assert!(cache.get(day(1)).await.is_none());
        assert!(!cache.contains(day(1)).await);
    }
}
