//! Login form automation.
//!
//! Success is decided by the URL after submitting: leaving the login path
//! means the credentials were accepted. This survives changes to the
//! dashboard's success banners but would misreport an application that keeps
//! the login path after a successful login.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};
use url::Url;

use super::browser::{LoadState, PageHandle};
use super::config::{Selectors, StepTimeouts};
use super::error::{ScrapeError, ScrapeResult};
use super::retry::RetryPolicy;
use super::session::Session;
use super::{endpoint, missing};
use crate::models::Credentials;

/// Path of the login page relative to the base URL.
pub const LOGIN_PATH: &str = "login";

/// Drives the dashboard login form.
#[derive(Debug, Clone)]
pub struct Authenticator {
    base_url: String,
    credentials: Credentials,
    selectors: Selectors,
    timeouts: StepTimeouts,
    retry: RetryPolicy,
    failure_screenshot: Option<PathBuf>,
}

impl Authenticator {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        selectors: Selectors,
        timeouts: StepTimeouts,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            selectors,
            timeouts,
            retry,
            failure_screenshot: None,
        }
    }

    /// Save a screenshot here whenever a login attempt is rejected.
    pub fn with_failure_screenshot(mut self, path: Option<PathBuf>) -> Self {
        self.failure_screenshot = path;
        self
    }

    pub fn login_url(&self) -> String {
        endpoint(&self.base_url, LOGIN_PATH)
    }

    /// Log in on the session's page. `Ok(false)` means the dashboard did not
    /// accept the login; errors are failures to even show the form.
    pub async fn login(&self, session: &Session) -> ScrapeResult<bool> {
        let page = session.page();
        self.retry
            .run("login", ScrapeError::is_transient, |_| self.attempt(page))
            .await
    }

    async fn attempt(&self, page: &dyn PageHandle) -> ScrapeResult<bool> {
        info!("Attempting to login to Time Doctor");

        let login_url = self.login_url();
        if let Err(e) = self.open_form(page, &login_url).await {
            error!("Login error: {}", e);
            return Ok(false);
        }

        // The form never rendering is not a credentials problem.
        page.wait_for_selector(&self.selectors.email_input, self.timeouts.email_selector())
            .await?;

        if let Err(e) = self.fill_form(page).await {
            error!("Login error: {}", e);
            return Ok(false);
        }

        self.submit(page).await?;

        // The dashboard keeps background requests open, so DOM readiness is
        // the only reliable settle signal.
        if let Err(e) = page
            .wait_for_load_state(LoadState::DomContentLoaded, self.timeouts.post_login())
            .await
        {
            error!("Login error: {}", e);
            return Ok(false);
        }

        let current_url = page.url().await?;
        debug!("Current URL after login attempt: {}", current_url);

        if !is_login_url(&current_url) {
            info!("Login successful - redirected to {}", current_url);
            return Ok(true);
        }

        self.report_failure(page).await;
        Ok(false)
    }

    async fn open_form(&self, page: &dyn PageHandle, login_url: &str) -> ScrapeResult<()> {
        page.goto(login_url, LoadState::Load, self.timeouts.page_load())
            .await?;
        debug!("Navigated to {}", login_url);
        page.wait_for_load_state(LoadState::DomContentLoaded, self.timeouts.login_form())
            .await?;
        Ok(())
    }

    async fn fill_form(&self, page: &dyn PageHandle) -> ScrapeResult<()> {
        let email = page
            .query_selector(&self.selectors.email_input)
            .await?
            .ok_or_else(|| missing(&self.selectors.email_input))?;
        email.fill(self.credentials.email()).await?;
        debug!("Email filled");

        let password = page
            .query_selector(&self.selectors.password_input)
            .await?
            .ok_or_else(|| missing(&self.selectors.password_input))?;
        password.fill(self.credentials.password()).await?;
        debug!("Password filled");
        Ok(())
    }

    /// Click submit while watching for the resulting navigation.
    async fn submit(&self, page: &dyn PageHandle) -> ScrapeResult<()> {
        let button = page
            .query_selector(&self.selectors.submit_button)
            .await?
            .ok_or_else(|| missing(&self.selectors.submit_button))?;

        debug!("Clicking login button...");
        let (navigation, click) = tokio::join!(
            page.wait_for_navigation(LoadState::Load, self.timeouts.login_navigation()),
            button.click(),
        );
        click?;

        match navigation {
            Ok(()) => debug!("Navigation after login completed"),
            // In-page transitions do not fire a navigation; the URL check decides.
            Err(e) => warn!("Navigation wait failed: {}, checking URL anyway...", e),
        }
        Ok(())
    }

    async fn report_failure(&self, page: &dyn PageHandle) {
        if let Ok(Some(alert)) = page.query_selector(&self.selectors.login_error).await {
            if let Ok(text) = alert.inner_text().await {
                error!("Login failed with error: {}", text.trim());
            }
        }

        error!("Login failed - still on login page");
        error!("Credentials used - Email: {}", self.credentials.email());

        if let Some(path) = &self.failure_screenshot {
            match page.screenshot(path).await {
                Ok(()) => info!("Saved login failure screenshot to {}", path.display()),
                Err(e) => warn!("Could not save login failure screenshot: {}", e),
            }
        }
    }
}

/// Whether `url` points at the login page.
pub fn is_login_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .is_some_and(|mut segments| segments.any(|s| s == LOGIN_PATH)),
        Err(_) => url.contains("/login"),
    }
}
