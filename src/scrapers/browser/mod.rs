//! Browser automation boundary.
//!
//! The fetch engine only talks to these traits. The `chromium` module
//! implements them over the Chrome DevTools Protocol; tests use a scripted
//! fake. Every handle is `Send + Sync` and every operation takes `&self`, so
//! components can borrow a page for the length of one call.
//!
//! The hierarchy mirrors the resources torn down at session end:
//! engine → browser → context → page → element.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "browser")]
pub mod chromium;
#[cfg(test)]
pub(crate) mod fake;

#[cfg(feature = "browser")]
pub use chromium::ChromiumEngine;

/// Errors raised by the automation engine.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to start the engine or launch the browser process.
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Navigation to a URL failed or timed out.
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    /// A wait condition was not satisfied within the timeout.
    #[error("wait condition '{condition}' timed out after {timeout:?}")]
    WaitTimeout { condition: String, timeout: Duration },

    /// An element that had to exist was not found.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A DOM interaction or script evaluation failed.
    #[error("page interaction failed: {0}")]
    Interaction(String),

    /// The handle was already closed.
    #[error("{0} is already closed")]
    AlreadyClosed(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Page load milestones that a settle wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// `DOMContentLoaded` fired (`document.readyState` is at least `interactive`).
    DomContentLoaded,
    /// The `load` event fired (`document.readyState` is `complete`).
    Load,
}

impl LoadState {
    /// Whether a `document.readyState` value satisfies this state.
    pub fn is_reached_by(&self, ready_state: &str) -> bool {
        match self {
            LoadState::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            LoadState::Load => ready_state == "complete",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::DomContentLoaded => write!(f, "domcontentloaded"),
            LoadState::Load => write!(f, "load"),
        }
    }
}

/// An element locator: a CSS selector, optionally narrowed to the first
/// match whose text content contains `has_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_text: Option<String>,
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            has_text: None,
        }
    }

    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            has_text: Some(text.into()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.has_text {
            Some(text) => write!(f, "{}:has-text({:?})", self.css, text),
            None => write!(f, "{}", self.css),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Everything needed to bring up one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: String,
    pub default_timeout: Duration,
}

/// Entry point of the automation engine.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Start the engine and return a handle that can launch browsers.
    async fn start(&self) -> BrowserResult<Box<dyn EngineHandle>>;
}

/// A running automation engine.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn launch(&self, headless: bool) -> BrowserResult<Box<dyn BrowserHandle>>;
    async fn stop(&self) -> BrowserResult<()>;
}

/// A launched browser process.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_context(
        &self,
        viewport: Viewport,
        user_agent: &str,
    ) -> BrowserResult<Box<dyn ContextHandle>>;
    async fn close(&self) -> BrowserResult<()>;
}

/// An isolated browsing context (cookies, storage, pages).
#[async_trait]
pub trait ContextHandle: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>>;
    async fn close(&self) -> BrowserResult<()>;
}

/// A browser tab.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Timeout used by operations that do not take an explicit one.
    fn set_default_timeout(&self, timeout: Duration);

    async fn goto(&self, url: &str, wait_until: LoadState, timeout: Duration) -> BrowserResult<()>;
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> BrowserResult<()>;
    async fn wait_for_selector(&self, selector: &Selector, timeout: Duration) -> BrowserResult<()>;

    /// Wait until a navigation that starts after this call reaches `state`.
    async fn wait_for_navigation(&self, state: LoadState, timeout: Duration) -> BrowserResult<()>;

    async fn query_selector(&self, selector: &Selector)
        -> BrowserResult<Option<Box<dyn ElementHandle>>>;
    async fn url(&self) -> BrowserResult<String>;
    async fn content(&self) -> BrowserResult<String>;
    async fn screenshot(&self, path: &Path) -> BrowserResult<()>;
    async fn close(&self) -> BrowserResult<()>;
}

/// A DOM element resolved by `PageHandle::query_selector`.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn click(&self) -> BrowserResult<()>;
    async fn fill(&self, text: &str) -> BrowserResult<()>;
    async fn is_disabled(&self) -> BrowserResult<bool>;
    async fn inner_text(&self) -> BrowserResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_state_ready_states() {
        assert!(LoadState::DomContentLoaded.is_reached_by("interactive"));
        assert!(LoadState::DomContentLoaded.is_reached_by("complete"));
        assert!(!LoadState::DomContentLoaded.is_reached_by("loading"));
        assert!(LoadState::Load.is_reached_by("complete"));
        assert!(!LoadState::Load.is_reached_by("interactive"));
    }

    #[test]
    fn test_selector_display() {
        assert_eq!(Selector::css("input").to_string(), "input");
        assert_eq!(
            Selector::with_text("button", "Expand All").to_string(),
            r#"button:has-text("Expand All")"#
        );
    }
}
