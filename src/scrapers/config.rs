//! Scraper configuration: selectors, step timeouts, retry and browser settings.
//!
//! Everything here is tied to the dashboard's current markup and behaviour,
//! so all of it is overridable from the config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::browser::{LaunchOptions, Selector, Viewport};
use super::retry::RetryPolicy;

/// Default user agent presented by the automated browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// DOM selectors for every element the engine touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub email_input: Selector,
    pub password_input: Selector,
    pub submit_button: Selector,
    /// Inline login error, read for diagnostics only.
    pub login_error: Selector,
    /// Button showing the current report date ("Nov 4, 2025").
    pub date_display: Selector,
    pub previous_day: Selector,
    pub next_day: Selector,
    pub expand_all: Selector,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            email_input: Selector::css(r#"input[type="email"]"#),
            password_input: Selector::css(r#"input[type="password"]"#),
            submit_button: Selector::css(r#"button[type="submit"]"#),
            login_error: Selector::css(r#".error, .alert, [role="alert"]"#),
            date_display: Selector::with_text("button", ", 20"),
            previous_day: Selector::with_text("button.navigation-button", "keyboard_arrow_left"),
            next_day: Selector::with_text("button.navigation-button", "keyboard_arrow_right"),
            expand_all: Selector::with_text("button", "Expand All"),
        }
    }
}

/// Bounded waits for each step, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepTimeouts {
    pub page_load_ms: u64,
    pub login_form_ms: u64,
    pub email_selector_ms: u64,
    pub login_navigation_ms: u64,
    pub post_login_ms: u64,
    pub report_page_ms: u64,
    pub date_navigation_ms: u64,
    pub expand_all_ms: u64,
    pub content_load_ms: u64,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            page_load_ms: 60_000,
            login_form_ms: 15_000,
            email_selector_ms: 15_000,
            login_navigation_ms: 30_000,
            post_login_ms: 15_000,
            report_page_ms: 20_000,
            date_navigation_ms: 10_000,
            expand_all_ms: 10_000,
            content_load_ms: 15_000,
        }
    }
}

impl StepTimeouts {
    pub fn page_load(&self) -> Duration {
        Duration::from_millis(self.page_load_ms)
    }
    pub fn login_form(&self) -> Duration {
        Duration::from_millis(self.login_form_ms)
    }
    pub fn email_selector(&self) -> Duration {
        Duration::from_millis(self.email_selector_ms)
    }
    pub fn login_navigation(&self) -> Duration {
        Duration::from_millis(self.login_navigation_ms)
    }
    pub fn post_login(&self) -> Duration {
        Duration::from_millis(self.post_login_ms)
    }
    pub fn report_page(&self) -> Duration {
        Duration::from_millis(self.report_page_ms)
    }
    pub fn date_navigation(&self) -> Duration {
        Duration::from_millis(self.date_navigation_ms)
    }
    pub fn expand_all(&self) -> Duration {
        Duration::from_millis(self.expand_all_ms)
    }
    pub fn content_load(&self) -> Duration {
        Duration::from_millis(self.content_load_ms)
    }
}

/// Retry settings as they appear in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.multiplier,
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Browser launch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Default timeout applied to every page operation, in milliseconds.
    pub timeout_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    /// Chrome/Chromium executable (None = auto-detect).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    /// Extra command-line arguments for the browser process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            timeout_ms: 30_000,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_path: None,
            args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Convert to the engine-facing launch options.
    pub fn to_launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            user_agent: self.user_agent.clone(),
            default_timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// What to do when the page ends up on a different date than requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMismatchPolicy {
    /// Return the document with the displayed date attached; never cache it.
    #[default]
    Flag,
    /// Fail the fetch for that date.
    Fail,
}

/// All scraper behaviour that is not credentials or storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub browser: BrowserConfig,
    pub selectors: Selectors,
    pub timeouts: StepTimeouts,
    pub retry: RetryConfig,
    pub on_date_mismatch: DateMismatchPolicy,
}
