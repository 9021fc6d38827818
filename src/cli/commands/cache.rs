//! Cache inspection.

use std::path::PathBuf;

use console::style;

use crate::config::Settings;
use crate::models::TargetDate;
use crate::repository::{open_store, ReportCache};

/// Print or save the cached report for `date`.
pub async fn cmd_cache_get(
    settings: &Settings,
    date: TargetDate,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    // Reads the configured store even when fetches run with the cache off.
    let store = open_store(
        settings.cache_backend,
        &settings.cache_dir,
        settings.cache_max_age,
    )?;
    let cache = ReportCache::new(store);

    let Some(document) = cache.get(date).await else {
        println!("{} No cached report for {}", style("!").yellow(), date);
        return Ok(());
    };

    match out {
        Some(path) => {
            tokio::fs::write(&path, document.html()).await?;
            println!(
                "{} {} → {} ({} bytes)",
                style("✓").green(),
                date,
                path.display(),
                document.html().len()
            );
        }
        None => println!("{}", document.html()),
    }
    Ok(())
}
