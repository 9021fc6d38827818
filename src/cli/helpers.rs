//! Shared helper functions for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use tracing::info;

use crate::config::Settings;
use crate::models::FetchResult;
use crate::repository::{open_store, ReportCache};
use crate::scrapers::browser::AutomationEngine;
use crate::scrapers::TeardownReport;

/// The browser engine for this build.
#[cfg(feature = "browser")]
pub fn engine(settings: &Settings) -> anyhow::Result<Arc<dyn AutomationEngine>> {
    let browser = &settings.scraper.browser;
    Ok(Arc::new(crate::scrapers::browser::ChromiumEngine::new(
        browser.chrome_path.clone(),
        browser.args.clone(),
    )))
}

#[cfg(not(feature = "browser"))]
pub fn engine(_settings: &Settings) -> anyhow::Result<Arc<dyn AutomationEngine>> {
    anyhow::bail!("tdfetch was built without the `browser` feature")
}

/// Open the configured report cache, or `None` when caching is disabled.
pub fn open_cache(settings: &Settings) -> anyhow::Result<Option<ReportCache>> {
    if !settings.use_cache {
        info!("Cache disabled");
        return Ok(None);
    }
    let store = open_store(
        settings.cache_backend,
        &settings.cache_dir,
        settings.cache_max_age,
    )?;
    info!(
        "Cache enabled ({} at {})",
        settings.cache_backend.as_str(),
        settings.cache_dir.display()
    );
    Ok(Some(ReportCache::new(store)))
}

/// Write `<dir>/<date>.html` for every result and return the paths.
pub async fn write_reports(dir: &Path, results: &[FetchResult]) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut paths = Vec::with_capacity(results.len());
    for result in results {
        let path = dir.join(format!("{}.html", result.date.as_key()));
        tokio::fs::write(&path, &result.html).await?;
        paths.push(path);
    }
    Ok(paths)
}

/// Print one line per result, flagging reports whose date was not confirmed.
pub fn print_summary(results: &[FetchResult], paths: &[PathBuf]) {
    for (result, path) in results.iter().zip(paths) {
        match result.displayed_date {
            Some(displayed) => println!(
                "{} {} → {} (page showed {})",
                style("!").yellow(),
                result.date,
                path.display(),
                displayed
            ),
            None if !result.verified => println!(
                "{} {} → {} (date not verified)",
                style("!").yellow(),
                result.date,
                path.display()
            ),
            None => println!(
                "{} {} → {} ({} bytes)",
                style("✓").green(),
                result.date,
                path.display(),
                result.html.len()
            ),
        }
    }
}

/// Warn about resources the last teardown could not close.
pub fn print_teardown(report: Option<&TeardownReport>) {
    let Some(report) = report else {
        return;
    };
    for failure in &report.failures {
        eprintln!(
            "{} Could not close {}: {}",
            style("!").yellow(),
            failure.resource,
            failure.message
        );
    }
}
