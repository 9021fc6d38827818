//! Single-date report retrieval.

use tracing::{debug, info, warn};

use super::browser::{LoadState, PageHandle};
use super::config::{DateMismatchPolicy, ScraperConfig, Selectors, StepTimeouts};
use super::endpoint;
use super::error::{ScrapeError, ScrapeResult};
use super::navigator::DateNavigator;
use super::retry::RetryPolicy;
use super::session::Session;
use crate::models::{ReportDocument, TargetDate};
use crate::repository::ReportCache;

/// Path of the report view relative to the base URL.
pub const REPORT_PATH: &str = "projects-report";

/// Produces the report HTML for one date on an authenticated session.
#[derive(Debug, Clone)]
pub struct ReportFetcher {
    base_url: String,
    selectors: Selectors,
    timeouts: StepTimeouts,
    retry: RetryPolicy,
    navigator: DateNavigator,
    on_date_mismatch: DateMismatchPolicy,
    cache: Option<ReportCache>,
}

impl ReportFetcher {
    /// `cache: None` disables caching: the cache is neither read nor written.
    pub fn new(base_url: impl Into<String>, config: &ScraperConfig, cache: Option<ReportCache>) -> Self {
        Self {
            base_url: base_url.into(),
            selectors: config.selectors.clone(),
            timeouts: config.timeouts.clone(),
            retry: config.retry.to_policy(),
            navigator: DateNavigator::new(config.selectors.clone(), config.timeouts.clone()),
            on_date_mismatch: config.on_date_mismatch,
            cache,
        }
    }

    pub fn report_url(&self) -> String {
        endpoint(&self.base_url, REPORT_PATH)
    }

    pub fn cache(&self) -> Option<&ReportCache> {
        self.cache.as_ref()
    }

    /// Fetch the report for `date`.
    ///
    /// A cache hit returns without touching the browser. Otherwise the
    /// report-view/navigate/expand/capture sequence is retried as a whole,
    /// and every retry starts from a fresh load of the report view.
    pub async fn fetch(
        &self,
        session: &Session,
        date: TargetDate,
        navigate_to_report_view: bool,
    ) -> ScrapeResult<ReportDocument> {
        info!("Fetching daily report for {}", date);

        if let Some(cache) = &self.cache {
            if let Some(document) = cache.get(date).await {
                info!("Using cached report for {}", date);
                return Ok(document);
            }
        }

        let document = self
            .retry
            .run("fetch report", ScrapeError::is_transient, |attempt| {
                self.fetch_live(session, date, navigate_to_report_view || attempt > 1)
            })
            .await?;

        if !document.is_verified() {
            return self.unverified(document);
        }

        if let Some(cache) = &self.cache {
            cache.set(&document).await;
        }
        Ok(document)
    }

    /// Apply the mismatch policy to a document whose header did not confirm
    /// the requested date. Such documents are never cached.
    fn unverified(&self, document: ReportDocument) -> ScrapeResult<ReportDocument> {
        let date = document.date();
        match (self.on_date_mismatch, document.mismatch()) {
            (DateMismatchPolicy::Fail, Some(displayed)) => Err(ScrapeError::DateMismatch {
                requested: date,
                displayed,
            }),
            (DateMismatchPolicy::Fail, None) => {
                Err(ScrapeError::DateUnverified { requested: date })
            }
            (DateMismatchPolicy::Flag, Some(displayed)) => {
                warn!(
                    "Report requested for {} shows {}; returning it flagged and uncached",
                    date, displayed
                );
                Ok(document)
            }
            (DateMismatchPolicy::Flag, None) => {
                warn!(
                    "Could not verify the date of the report for {}; returning it flagged and uncached",
                    date
                );
                Ok(document)
            }
        }
    }

    async fn fetch_live(
        &self,
        session: &Session,
        date: TargetDate,
        navigate_to_report_view: bool,
    ) -> ScrapeResult<ReportDocument> {
        let page = session.page();

        if navigate_to_report_view {
            let url = self.report_url();
            page.goto(&url, LoadState::Load, self.timeouts.page_load())
                .await?;
            page.wait_for_load_state(LoadState::DomContentLoaded, self.timeouts.report_page())
                .await?;
            info!("Navigated to reports page");
        }

        let outcome = self.navigator.navigate_to(session, date).await?;

        self.expand_all(page).await;

        page.wait_for_load_state(LoadState::DomContentLoaded, self.timeouts.content_load())
            .await?;
        let html = page.content().await?;
        info!("Successfully retrieved report HTML ({} bytes)", html.len());

        Ok(ReportDocument::live(date, html, outcome.end))
    }

    /// Click "Expand All" when it is there. Nothing to expand is fine, and a
    /// failed click only costs collapsed sections.
    async fn expand_all(&self, page: &dyn PageHandle) {
        let button = match page.query_selector(&self.selectors.expand_all).await {
            Ok(Some(button)) => button,
            Ok(None) => return,
            Err(e) => {
                warn!("Could not look for Expand All: {}", e);
                return;
            }
        };

        if let Err(e) = button.click().await {
            warn!("Could not click Expand All: {}", e);
            return;
        }
        debug!("Clicked Expand All button");

        if let Err(e) = page
            .wait_for_load_state(LoadState::DomContentLoaded, self.timeouts.expand_all())
            .await
        {
            warn!("Page did not settle after Expand All: {}", e);
        }
    }
}
