//! One browser session, one login, many dates.

use std::sync::Arc;

use tracing::{error, info};

use super::auth::Authenticator;
use super::browser::AutomationEngine;
use super::error::{ScrapeError, ScrapeResult};
use super::fetcher::ReportFetcher;
use super::session::{Session, SessionManager, SessionStatus, TeardownReport};
use crate::config::{ConfigError, Settings};
use crate::models::{DocumentOrigin, FetchResult, TargetDate};
use crate::repository::ReportCache;

/// Drives a full run: start the session, log in once, fetch each date in
/// order, always tear down.
pub struct SessionOrchestrator {
    sessions: SessionManager,
    authenticator: Authenticator,
    fetcher: ReportFetcher,
    last_teardown: Option<TeardownReport>,
}

impl SessionOrchestrator {
    pub fn new(
        sessions: SessionManager,
        authenticator: Authenticator,
        fetcher: ReportFetcher,
    ) -> Self {
        Self {
            sessions,
            authenticator,
            fetcher,
            last_teardown: None,
        }
    }

    /// Wire every component from resolved settings. Fails before any
    /// browser work if the settings are incomplete.
    pub fn from_settings(
        settings: &Settings,
        engine: Arc<dyn AutomationEngine>,
        cache: Option<ReportCache>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let scraper = &settings.scraper;
        let retry = scraper.retry.to_policy();

        let sessions =
            SessionManager::new(engine, scraper.browser.to_launch_options(), retry.clone());
        let authenticator = Authenticator::new(
            settings.base_url.clone(),
            settings.credentials()?,
            scraper.selectors.clone(),
            scraper.timeouts.clone(),
            retry,
        )
        .with_failure_screenshot(settings.login_failure_screenshot.clone());
        let fetcher = ReportFetcher::new(settings.base_url.clone(), scraper, cache);

        Ok(Self::new(sessions, authenticator, fetcher))
    }

    /// Teardown report of the most recent run, if any.
    pub fn last_teardown(&self) -> Option<&TeardownReport> {
        self.last_teardown.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.sessions.status()
    }

    /// Fetch a single date in its own session.
    pub async fn fetch_date(&mut self, date: TargetDate) -> ScrapeResult<FetchResult> {
        info!("Fetching report for {}", date);
        let mut results = self.run(date, date).await?;
        results.pop().ok_or(ScrapeError::SessionNotOpen)
    }

    /// Fetch every date in `[start, end]` in one session. Results are in
    /// ascending date order. The first unrecovered failure aborts the run.
    pub async fn fetch_range(
        &mut self,
        start: TargetDate,
        end: TargetDate,
    ) -> ScrapeResult<Vec<FetchResult>> {
        if end < start {
            return Err(ScrapeError::InvalidRange { start, end });
        }
        info!("Fetching date range reports from {} to {}", start, end);
        let results = self.run(start, end).await?;
        info!(
            "Successfully retrieved {} daily reports in one session",
            results.len()
        );
        Ok(results)
    }

    /// Check that the configured credentials are accepted, in a throwaway
    /// session.
    pub async fn check_login(&mut self) -> ScrapeResult<bool> {
        let result = match self.sessions.start().await {
            Ok(session) => self.authenticator.login(session).await,
            Err(e) => Err(e),
        };
        self.stop().await;
        result
    }

    /// Tear down the session if one is open. Safe to call at any time.
    pub async fn stop(&mut self) -> &TeardownReport {
        let report = self.sessions.stop().await;
        self.last_teardown.insert(report)
    }

    async fn run(&mut self, start: TargetDate, end: TargetDate) -> ScrapeResult<Vec<FetchResult>> {
        if end < start {
            return Err(ScrapeError::InvalidRange { start, end });
        }

        let result = match self.sessions.start().await {
            Ok(session) => {
                fetch_all(&self.authenticator, &self.fetcher, session, start, end).await
            }
            Err(e) => Err(e),
        };

        let report = self.stop().await;
        if !report.is_clean() {
            error!(
                "Session teardown left {} resource(s) unclosed",
                report.failures.len()
            );
        }
        result
    }
}

async fn fetch_all(
    authenticator: &Authenticator,
    fetcher: &ReportFetcher,
    session: &Session,
    start: TargetDate,
    end: TargetDate,
) -> ScrapeResult<Vec<FetchResult>> {
    if !authenticator.login(session).await? {
        return Err(ScrapeError::LoginFailed);
    }

    let dates = TargetDate::range_inclusive(start, end);
    let mut results = Vec::with_capacity(dates.len());
    // Only the first live fetch loads the report view; later dates page from
    // there. Cache hits leave the page wherever it was.
    let mut on_report_view = false;
    for date in dates {
        let document = fetcher.fetch(session, date, !on_report_view).await?;
        if document.origin() == DocumentOrigin::Live {
            on_report_view = true;
        }
        results.push(FetchResult::from(document));
    }
    Ok(results)
}
