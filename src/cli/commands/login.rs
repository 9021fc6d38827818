//! Credential check.

use std::path::PathBuf;

use console::style;

use super::super::helpers::{engine, print_teardown};
use crate::config::Settings;
use crate::scrapers::SessionOrchestrator;

/// Log in once and report whether the dashboard accepted the credentials.
pub async fn cmd_check_login(settings: &Settings, screenshot: Option<PathBuf>) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if screenshot.is_some() {
        settings.login_failure_screenshot = screenshot;
    }

    let mut orchestrator = SessionOrchestrator::from_settings(&settings, engine(&settings)?, None)?;
    let accepted = orchestrator.check_login().await;
    print_teardown(orchestrator.last_teardown());

    if accepted? {
        println!(
            "{} Logged in to {} as {}",
            style("✓").green(),
            settings.base_url,
            settings.email.as_deref().unwrap_or_default()
        );
        Ok(())
    } else {
        println!("{} Login rejected", style("✗").red());
        if let Some(path) = &settings.login_failure_screenshot {
            println!("  Screenshot: {}", path.display());
        }
        anyhow::bail!("login failed")
    }
}
