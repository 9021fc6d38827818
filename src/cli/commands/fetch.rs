//! Report fetch commands.

use std::path::PathBuf;

use console::style;

use super::super::helpers::{engine, open_cache, print_summary, print_teardown, write_reports};
use crate::config::Settings;
use crate::models::{FetchResult, TargetDate};
use crate::scrapers::SessionOrchestrator;

/// Fetch one date.
pub async fn cmd_fetch(
    settings: &Settings,
    date: TargetDate,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut orchestrator =
        SessionOrchestrator::from_settings(settings, engine(settings)?, open_cache(settings)?)?;

    let outcome = tokio::select! {
        result = orchestrator.fetch_date(date) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(result) = outcome else {
        return interrupted(&mut orchestrator).await;
    };
    print_teardown(orchestrator.last_teardown());

    emit(vec![result?], out).await
}

/// Fetch an inclusive date range in one session.
pub async fn cmd_range(
    settings: &Settings,
    start: TargetDate,
    end: TargetDate,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut orchestrator =
        SessionOrchestrator::from_settings(settings, engine(settings)?, open_cache(settings)?)?;

    let outcome = tokio::select! {
        result = orchestrator.fetch_range(start, end) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(results) = outcome else {
        return interrupted(&mut orchestrator).await;
    };
    print_teardown(orchestrator.last_teardown());

    emit(results?, out).await
}

async fn emit(results: Vec<FetchResult>, out: Option<PathBuf>) -> anyhow::Result<()> {
    match out {
        Some(dir) => {
            let paths = write_reports(&dir, &results).await?;
            print_summary(&results, &paths);
        }
        None if results.len() == 1 => {
            println!("{}", serde_json::to_string_pretty(&results[0])?);
        }
        None => println!("{}", serde_json::to_string_pretty(&results)?),
    }
    Ok(())
}

/// The run was cancelled mid-operation; the session still has to go.
async fn interrupted(orchestrator: &mut SessionOrchestrator) -> anyhow::Result<()> {
    eprintln!("{} Interrupted, closing browser...", style("!").yellow());
    orchestrator.stop().await;
    print_teardown(orchestrator.last_teardown());
    anyhow::bail!("interrupted")
}
