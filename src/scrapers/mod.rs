//! Session-oriented fetch engine for the Time Doctor dashboard.
//!
//! The dashboard has no API, so reports are read from a real browser:
//! - `session`: browser lifecycle
//! - `auth`: login form
//! - `navigator`: relative date paging
//! - `fetcher`: single-date retrieval with caching
//! - `orchestrator`: one session for many dates

pub mod auth;
pub mod browser;
pub mod config;
mod error;
pub mod fetcher;
pub mod navigator;
pub mod orchestrator;
pub mod retry;
pub mod session;

pub use auth::Authenticator;
pub use config::{
    BrowserConfig, DateMismatchPolicy, RetryConfig, ScraperConfig, Selectors, StepTimeouts,
};
pub use error::{ScrapeError, ScrapeResult};
pub use fetcher::ReportFetcher;
pub use navigator::{DateNavigator, NavigationOutcome, NavigationStop};
pub use orchestrator::SessionOrchestrator;
pub use retry::RetryPolicy;
pub use session::{SessionManager, SessionStatus, TeardownReport};

use browser::{BrowserError, Selector};

/// Join `path` onto the dashboard base URL.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Error for an element a step cannot proceed without.
pub(crate) fn missing(selector: &Selector) -> ScrapeError {
    ScrapeError::Browser(BrowserError::ElementNotFound(selector.to_string()))
}
