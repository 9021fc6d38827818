//! Directory of `<YYYY-MM-DD>.html` files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::debug;

use super::report_cache::CacheStore;
use super::Result;
use crate::models::TargetDate;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    max_age: Option<Duration>,
}

impl FileStore {
    /// Use `dir` for cache files, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            max_age: None,
        })
    }

    /// Ignore files last written more than `max_age` ago.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: TargetDate) -> PathBuf {
        self.dir.join(format!("{}.html", key.as_key()))
    }

    fn is_stale(&self, modified: SystemTime) -> bool {
        match self.max_age {
            Some(max_age) => modified
                .elapsed()
                .map(|age| age > max_age)
                .unwrap_or(false),
            None => false,
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self, key: TargetDate) -> Result<Option<String>> {
        let path = self.path_for(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.is_stale(metadata.modified()?) {
            debug!("Cache file {} is older than the max age", path.display());
            return Ok(None);
        }

        Ok(Some(tokio::fs::read_to_string(&path).await?))
    }

    async fn write(&self, key: TargetDate, html: &str) -> Result<()> {
        let path = self.path_for(key);
        // Write then rename so readers never see a partial file.
        let tmp = self.dir.join(format!(".{}.html.tmp", key.as_key()));
        tokio::fs::write(&tmp, html).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Wrote {} bytes to {}", html.len(), path.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
