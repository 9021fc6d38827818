//! Error type for the fetch engine.

use chrono::NaiveDate;
use thiserror::Error;

use super::browser::BrowserError;
use crate::config::ConfigError;
use crate::models::{InvalidDate, TargetDate};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    InvalidDate(#[from] InvalidDate),

    #[error("invalid date range: end {end} is before start {start}")]
    InvalidRange { start: TargetDate, end: TargetDate },

    /// Credentials were rejected (still on the login page after submit).
    #[error("login failed: still on the login page")]
    LoginFailed,

    #[error("a browser session is already open")]
    SessionAlreadyOpen,

    #[error("no browser session is open")]
    SessionNotOpen,

    /// The report page shows a different date than the one requested.
    #[error("requested report for {requested} but the page shows {displayed}")]
    DateMismatch {
        requested: TargetDate,
        displayed: NaiveDate,
    },

    /// The report page's date header could not be read after navigating.
    #[error("could not confirm that the report page shows {requested}")]
    DateUnverified { requested: TargetDate },
}

impl ScrapeError {
    /// Whether retrying the whole operation might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ScrapeError::Browser(e) => !matches!(e, BrowserError::AlreadyClosed(_)),
            ScrapeError::Config(_)
            | ScrapeError::InvalidDate(_)
            | ScrapeError::InvalidRange { .. }
            | ScrapeError::LoginFailed
            | ScrapeError::SessionAlreadyOpen
            | ScrapeError::SessionNotOpen
            | ScrapeError::DateMismatch { .. }
            | ScrapeError::DateUnverified { .. } => false,
        }
    }
}

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(ScrapeError::Browser(BrowserError::WaitTimeout {
            condition: "selector".to_string(),
            timeout: Duration::from_secs(1),
        })
        .is_transient());
        assert!(ScrapeError::Browser(BrowserError::LaunchFailed("boom".to_string())).is_transient());
        assert!(!ScrapeError::Browser(BrowserError::AlreadyClosed("page")).is_transient());
        assert!(!ScrapeError::LoginFailed.is_transient());
        assert!(!ScrapeError::Config(ConfigError::MissingField("email")).is_transient());
    }
}
