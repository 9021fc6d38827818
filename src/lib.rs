//! tdfetch: daily Time Doctor reports from a real browser session.
//!
//! The dashboard offers no API. `SessionOrchestrator` starts one browser
//! session, logs in once, pages the report view to each requested date and
//! returns the rendered HTML, caching verified reports by date.

pub mod cli;
pub mod config;
pub mod models;
pub mod repository;
pub mod scrapers;

pub use config::{ConfigError, Settings};
pub use models::{Credentials, FetchResult, ReportDocument, TargetDate};
pub use repository::ReportCache;
pub use scrapers::{ScrapeError, SessionOrchestrator};
