//! Domain types shared by the fetch engine, the cache and the CLI.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::ConfigError;

/// ISO date format used for targets and cache keys.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Short date format rendered by the dashboard's date button ("Nov 4, 2025").
pub const DISPLAY_DATE_FORMAT: &str = "%b %d, %Y";

/// Login credentials for the dashboard.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Create credentials; both fields must be non-empty.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let email = email.into();
        let password = password.into();

        if email.trim().is_empty() {
            return Err(ConfigError::MissingField("email"));
        }
        if password.is_empty() {
            return Err(ConfigError::MissingField("password"));
        }

        Ok(Self { email, password })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Error returned when a target date string is not `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date '{input}': expected YYYY-MM-DD")]
pub struct InvalidDate {
    pub input: String,
}

/// A calendar date to fetch. Doubles as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetDate(NaiveDate);

impl TargetDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Parse an ISO `YYYY-MM-DD` string.
    pub fn parse(input: &str) -> Result<Self, InvalidDate> {
        let trimmed = input.trim();
        // chrono accepts unpadded fields; the cache key format does not.
        if trimmed.len() != 10 {
            return Err(InvalidDate {
                input: input.to_string(),
            });
        }
        NaiveDate::parse_from_str(trimmed, ISO_DATE_FORMAT)
            .map(Self)
            .map_err(|_| InvalidDate {
                input: input.to_string(),
            })
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The cache key / wire form.
    pub fn as_key(&self) -> String {
        self.0.format(ISO_DATE_FORMAT).to_string()
    }

    pub fn succ(&self) -> Self {
        Self(self.0 + Duration::days(1))
    }

    /// Signed whole days from `self` to `other` (`other - self`).
    pub fn days_until(&self, other: NaiveDate) -> i64 {
        (other - self.0).num_days()
    }

    /// Every date in `[start, end]`, ascending. Empty if `end < start`.
    pub fn range_inclusive(start: TargetDate, end: TargetDate) -> Vec<TargetDate> {
        let mut dates = Vec::new();
        let mut current = start;
        while current <= end {
            dates.push(current);
            current = current.succ();
        }
        dates
    }
}

impl fmt::Display for TargetDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ISO_DATE_FORMAT))
    }
}

impl FromStr for TargetDate {
    type Err = InvalidDate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<NaiveDate> for TargetDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Serialize for TargetDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn display_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Z][a-z]{2})\s+(\d{1,2}),\s*(\d{4})").expect("valid display date regex")
    })
}

/// The date currently rendered by the dashboard's date button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayedDate(NaiveDate);

impl DisplayedDate {
    /// Parse the button text. The button may also contain icon glyph names
    /// or line breaks, so the first "Mon D, YYYY" occurrence is used.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = display_date_pattern().captures(text)?;
        let normalized = format!("{} {}, {}", &caps[1], &caps[2], &caps[3]);
        NaiveDate::parse_from_str(&normalized, DISPLAY_DATE_FORMAT)
            .ok()
            .map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DisplayedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%b %-d, %Y"))
    }
}

/// Where a report document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOrigin {
    Cache,
    Live,
}

/// Full rendered HTML of the report view for one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    date: TargetDate,
    html: String,
    displayed_date: Option<NaiveDate>,
    origin: DocumentOrigin,
}

impl ReportDocument {
    /// A document captured from the live page.
    pub fn live(date: TargetDate, html: String, displayed_date: Option<NaiveDate>) -> Self {
        Self {
            date,
            html,
            displayed_date,
            origin: DocumentOrigin::Live,
        }
    }

    /// A document read back from the cache. Cached documents were verified
    /// against the displayed date when stored.
    pub fn cached(date: TargetDate, html: String) -> Self {
        Self {
            date,
            html,
            displayed_date: Some(date.date()),
            origin: DocumentOrigin::Cache,
        }
    }

    pub fn date(&self) -> TargetDate {
        self.date
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn displayed_date(&self) -> Option<NaiveDate> {
        self.displayed_date
    }

    pub fn origin(&self) -> DocumentOrigin {
        self.origin
    }

    /// True when the page was confirmed to show the requested date.
    pub fn is_verified(&self) -> bool {
        self.displayed_date == Some(self.date.date())
    }

    /// The displayed date, if it was readable and differs from the request.
    pub fn mismatch(&self) -> Option<NaiveDate> {
        self.displayed_date.filter(|d| *d != self.date.date())
    }
}

/// Per-date result handed back to callers.
///
/// `verified` is false when the page header did not confirm the requested
/// date. `displayed_date` is set only when the header showed another date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub date: TargetDate,
    pub html: String,
    pub success: bool,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displayed_date: Option<NaiveDate>,
}

impl From<ReportDocument> for FetchResult {
    fn from(doc: ReportDocument) -> Self {
        let verified = doc.is_verified();
        let displayed_date = doc.mismatch();
        Self {
            date: doc.date,
            html: doc.html,
            success: true,
            verified,
            displayed_date,
        }
    }
}
