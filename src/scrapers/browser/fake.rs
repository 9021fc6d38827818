//! Scripted in-process dashboard used by unit tests.
//!
//! `FakeDashboard` implements the automation traits against a tiny state
//! machine: a login page that checks credentials, and a report page with a
//! date button, previous/next paging buttons and an "Expand All" button.
//! Every interaction is counted so tests can assert on exact click and
//! navigation sequences.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    AutomationEngine, BrowserError, BrowserHandle, BrowserResult, ContextHandle, ElementHandle,
    EngineHandle, LaunchOptions, LoadState, PageHandle, Selector, Viewport,
};
use crate::scrapers::config::Selectors;
use crate::scrapers::retry::RetryPolicy;
use crate::scrapers::session::SessionManager;

pub const BASE_URL: &str = "https://dash.example.test";
pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "hunter2";

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Retry policy with millisecond backoff so tests stay fast.
pub fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(1), 2.0, Duration::from_millis(2))
}

pub fn launch_options() -> LaunchOptions {
    LaunchOptions {
        headless: true,
        viewport: Viewport {
            width: 1920,
            height: 1080,
        },
        user_agent: "test-agent".to_string(),
        default_timeout: Duration::from_secs(30),
    }
}

/// A started session manager driving `app`.
pub async fn started(app: &FakeDashboard) -> SessionManager {
    let mut manager =
        SessionManager::new(Arc::new(app.clone()), launch_options(), RetryPolicy::no_retry());
    manager.start().await.unwrap();
    manager
}

/// Mutable state of the fake dashboard. Tests tweak the knobs directly.
#[derive(Debug)]
pub struct FakeState {
    pub url: String,
    pub email: String,
    pub password: String,
    pub filled_email: Option<String>,
    pub filled_password: Option<String>,
    pub login_error: Option<String>,
    pub show_login_error: bool,
    /// Render the email input on the login page.
    pub login_form_renders: bool,
    /// Submitting correct credentials changes the URL without a navigation event.
    pub silent_login_redirect: bool,

    /// Date the report page lands on when first opened.
    pub today: NaiveDate,
    pub displayed: Option<NaiveDate>,
    /// Replace the date button text (e.g. an unparseable label).
    pub display_text_override: Option<String>,
    pub date_display_present: bool,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    /// Remove the "previous" button after this many clicks.
    pub previous_missing_after: Option<u32>,
    pub expand_present: bool,
    pub expanded: bool,

    pub launch_failures: u32,
    /// Fail the next N `goto` calls (the URL is recorded but not loaded).
    pub goto_failures: u32,
    /// 1-based indices of `wait_for_load_state` calls that time out.
    pub failing_settles: Vec<u32>,
    pub fill_fails: bool,
    pub submit_click_fails: bool,
    pub content_failures: u32,
    pub fail_page_close: bool,
    pub fail_context_close: bool,
    pub fail_browser_close: bool,
    pub fail_engine_stop: bool,

    pub launches: u32,
    pub gotos: Vec<String>,
    pub navigations: u32,
    pub settles: u32,
    pub previous_clicks: u32,
    pub next_clicks: u32,
    pub expand_clicks: u32,
    pub submits: u32,
    pub content_reads: u32,
    pub screenshots: Vec<String>,
    pub default_timeout: Option<Duration>,
    pub viewport: Option<Viewport>,
    pub user_agent: Option<String>,
    pub closed: Vec<&'static str>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            email: EMAIL.to_string(),
            password: PASSWORD.to_string(),
            filled_email: None,
            filled_password: None,
            login_error: None,
            show_login_error: false,
            login_form_renders: true,
            silent_login_redirect: false,
            today: ymd(2025, 11, 4),
            displayed: None,
            display_text_override: None,
            date_display_present: true,
            min_date: None,
            max_date: None,
            previous_missing_after: None,
            expand_present: true,
            expanded: false,
            launch_failures: 0,
            goto_failures: 0,
            failing_settles: Vec::new(),
            fill_fails: false,
            submit_click_fails: false,
            content_failures: 0,
            fail_page_close: false,
            fail_context_close: false,
            fail_browser_close: false,
            fail_engine_stop: false,
            launches: 0,
            gotos: Vec::new(),
            navigations: 0,
            settles: 0,
            previous_clicks: 0,
            next_clicks: 0,
            expand_clicks: 0,
            submits: 0,
            content_reads: 0,
            screenshots: Vec::new(),
            default_timeout: None,
            viewport: None,
            user_agent: None,
            closed: Vec::new(),
        }
    }
}

impl FakeState {
    fn path(&self) -> &str {
        self.url.strip_prefix(BASE_URL).unwrap_or(&self.url)
    }

    fn on_login_page(&self) -> bool {
        self.path().starts_with("/login")
    }

    fn on_report_page(&self) -> bool {
        self.path().starts_with("/projects-report")
    }

    fn report_view_gotos(&self) -> usize {
        self.gotos
            .iter()
            .filter(|u| u.ends_with("/projects-report"))
            .count()
    }

    fn login_gotos(&self) -> usize {
        self.gotos.iter().filter(|u| u.ends_with("/login")).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Email,
    Password,
    Submit,
    LoginError,
    DateDisplay,
    Previous,
    Next,
    Expand,
}

/// Handle shared between the test and the engine it hands to the code under test.
#[derive(Clone)]
pub struct FakeDashboard {
    state: Arc<Mutex<FakeState>>,
    selectors: Arc<Selectors>,
}

impl Default for FakeDashboard {
    fn default() -> Self {
        Self::new(FakeState::default())
    }
}

impl FakeDashboard {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            selectors: Arc::new(Selectors::default()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn report_view_gotos(&self) -> usize {
        self.state().report_view_gotos()
    }

    pub fn login_gotos(&self) -> usize {
        self.state().login_gotos()
    }

    /// Put the page on the report view without recording a navigation.
    pub fn position_on_report_view(&self) {
        let mut state = self.state();
        state.url = format!("{BASE_URL}/projects-report");
        if state.displayed.is_none() {
            state.displayed = Some(state.today);
        }
    }

    fn kind_of(&self, selector: &Selector) -> Option<Kind> {
        let s = &self.selectors;
        [
            (&s.email_input, Kind::Email),
            (&s.password_input, Kind::Password),
            (&s.submit_button, Kind::Submit),
            (&s.login_error, Kind::LoginError),
            (&s.date_display, Kind::DateDisplay),
            (&s.previous_day, Kind::Previous),
            (&s.next_day, Kind::Next),
            (&s.expand_all, Kind::Expand),
        ]
        .into_iter()
        .find(|(candidate, _)| *candidate == selector)
        .map(|(_, kind)| kind)
    }

    fn is_present(&self, kind: Kind) -> bool {
        let state = self.state();
        match kind {
            Kind::Email => state.on_login_page() && state.login_form_renders,
            Kind::Password | Kind::Submit => state.on_login_page(),
            Kind::LoginError => {
                state.on_login_page() && state.show_login_error && state.login_error.is_some()
            }
            Kind::DateDisplay => state.on_report_page() && state.date_display_present,
            Kind::Previous => {
                state.on_report_page()
                    && state
                        .previous_missing_after
                        .map_or(true, |limit| state.previous_clicks < limit)
            }
            Kind::Next => state.on_report_page(),
            Kind::Expand => state.on_report_page() && state.expand_present,
        }
    }
}

#[async_trait]
impl AutomationEngine for FakeDashboard {
    async fn start(&self) -> BrowserResult<Box<dyn EngineHandle>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl EngineHandle for FakeDashboard {
    async fn launch(&self, _headless: bool) -> BrowserResult<Box<dyn BrowserHandle>> {
        let mut state = self.state();
        state.launches += 1;
        if state.launch_failures > 0 {
            state.launch_failures -= 1;
            return Err(BrowserError::LaunchFailed("crashed on start".to_string()));
        }
        Ok(Box::new(self.clone()))
    }

    async fn stop(&self) -> BrowserResult<()> {
        let mut state = self.state();
        if state.fail_engine_stop {
            return Err(BrowserError::Interaction("engine stop failed".to_string()));
        }
        state.closed.push("engine");
        Ok(())
    }
}

#[async_trait]
impl BrowserHandle for FakeDashboard {
    async fn new_context(
        &self,
        viewport: Viewport,
        user_agent: &str,
    ) -> BrowserResult<Box<dyn ContextHandle>> {
        let mut state = self.state();
        state.viewport = Some(viewport);
        state.user_agent = Some(user_agent.to_string());
        Ok(Box::new(self.clone()))
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut state = self.state();
        if state.fail_browser_close {
            return Err(BrowserError::Interaction("browser close failed".to_string()));
        }
        state.closed.push("browser");
        Ok(())
    }
}

#[async_trait]
impl ContextHandle for FakeDashboard {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>> {
        Ok(Box::new(FakePage { app: self.clone() }))
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut state = self.state();
        if state.fail_context_close {
            return Err(BrowserError::Interaction("context close failed".to_string()));
        }
        state.closed.push("context");
        Ok(())
    }
}

pub struct FakePage {
    app: FakeDashboard,
}

#[async_trait]
impl PageHandle for FakePage {
    fn set_default_timeout(&self, timeout: Duration) {
        self.app.state().default_timeout = Some(timeout);
    }

    async fn goto(&self, url: &str, _wait_until: LoadState, _timeout: Duration) -> BrowserResult<()> {
        let mut state = self.app.state();
        state.gotos.push(url.to_string());
        if state.goto_failures > 0 {
            state.goto_failures -= 1;
            return Err(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        state.url = url.to_string();
        state.navigations += 1;
        state.show_login_error = false;
        state.expanded = false;
        if state.on_report_page() && state.displayed.is_none() {
            state.displayed = Some(state.today);
        }
        Ok(())
    }

    async fn wait_for_load_state(&self, load_state: LoadState, timeout: Duration) -> BrowserResult<()> {
        let mut state = self.app.state();
        state.settles += 1;
        if state.failing_settles.contains(&state.settles) {
            return Err(BrowserError::WaitTimeout {
                condition: load_state.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &Selector, timeout: Duration) -> BrowserResult<()> {
        let present = self
            .app
            .kind_of(selector)
            .is_some_and(|kind| self.app.is_present(kind));
        if present {
            Ok(())
        } else {
            Err(BrowserError::WaitTimeout {
                condition: format!("selector '{selector}'"),
                timeout,
            })
        }
    }

    async fn wait_for_navigation(&self, _state: LoadState, timeout: Duration) -> BrowserResult<()> {
        let start = self.app.state().navigations;
        // Give concurrently-polled clicks a chance to run.
        for _ in 0..16 {
            tokio::task::yield_now().await;
            if self.app.state().navigations > start {
                return Ok(());
            }
        }
        Err(BrowserError::WaitTimeout {
            condition: "navigation".to_string(),
            timeout,
        })
    }

    async fn query_selector(
        &self,
        selector: &Selector,
    ) -> BrowserResult<Option<Box<dyn ElementHandle>>> {
        let Some(kind) = self.app.kind_of(selector) else {
            return Ok(None);
        };
        if !self.app.is_present(kind) {
            return Ok(None);
        }
        Ok(Some(Box::new(FakeElement {
            app: self.app.clone(),
            kind,
        })))
    }

    async fn url(&self) -> BrowserResult<String> {
        Ok(self.app.state().url.clone())
    }

    async fn content(&self) -> BrowserResult<String> {
        let mut state = self.app.state();
        state.content_reads += 1;
        if state.content_failures > 0 {
            state.content_failures -= 1;
            return Err(BrowserError::Interaction("target crashed".to_string()));
        }
        let date = state
            .displayed
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(format!(
            "<html><body data-date=\"{date}\" data-expanded=\"{}\">{}</body></html>",
            state.expanded,
            state.path()
        ))
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        self.app
            .state()
            .screenshots
            .push(path.display().to_string());
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut state = self.app.state();
        if state.fail_page_close {
            return Err(BrowserError::Interaction("page close failed".to_string()));
        }
        state.closed.push("page");
        Ok(())
    }
}

struct FakeElement {
    app: FakeDashboard,
    kind: Kind,
}

impl FakeElement {
    fn ensure_present(&self) -> BrowserResult<()> {
        if self.app.is_present(self.kind) {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(format!("{:?}", self.kind)))
        }
    }
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn click(&self) -> BrowserResult<()> {
        self.ensure_present()?;
        // Yield like a real CDP round trip so concurrent waiters interleave.
        tokio::task::yield_now().await;

        let mut state = self.app.state();
        match self.kind {
            Kind::Submit => {
                if state.submit_click_fails {
                    return Err(BrowserError::Interaction("submit click intercepted".to_string()));
                }
                state.submits += 1;
                let ok = state.filled_email.as_deref() == Some(state.email.as_str())
                    && state.filled_password.as_deref() == Some(state.password.as_str());
                if ok {
                    state.url = format!("{BASE_URL}/dashboard");
                    if !state.silent_login_redirect {
                        state.navigations += 1;
                    }
                } else {
                    state.show_login_error = true;
                }
            }
            Kind::Previous => {
                let current = state.displayed.unwrap_or(state.today);
                if state.min_date.is_some_and(|min| current <= min) {
                    return Err(BrowserError::Interaction("button is disabled".to_string()));
                }
                state.previous_clicks += 1;
                state.displayed = current.pred_opt();
            }
            Kind::Next => {
                let current = state.displayed.unwrap_or(state.today);
                if state.max_date.is_some_and(|max| current >= max) {
                    return Err(BrowserError::Interaction("button is disabled".to_string()));
                }
                state.next_clicks += 1;
                state.displayed = current.succ_opt();
            }
            Kind::Expand => {
                state.expand_clicks += 1;
                state.expanded = true;
            }
            Kind::Email | Kind::Password | Kind::LoginError | Kind::DateDisplay => {}
        }
        Ok(())
    }

    async fn fill(&self, text: &str) -> BrowserResult<()> {
        self.ensure_present()?;
        let mut state = self.app.state();
        if state.fill_fails {
            return Err(BrowserError::Interaction("element is not editable".to_string()));
        }
        match self.kind {
            Kind::Email => state.filled_email = Some(text.to_string()),
            Kind::Password => state.filled_password = Some(text.to_string()),
            other => {
                return Err(BrowserError::Interaction(format!("cannot fill {other:?}")));
            }
        }
        Ok(())
    }

    async fn is_disabled(&self) -> BrowserResult<bool> {
        self.ensure_present()?;
        let state = self.app.state();
        let current = state.displayed.unwrap_or(state.today);
        Ok(match self.kind {
            Kind::Previous => state.min_date.is_some_and(|min| current <= min),
            Kind::Next => state.max_date.is_some_and(|max| current >= max),
            _ => false,
        })
    }

    async fn inner_text(&self) -> BrowserResult<String> {
        self.ensure_present()?;
        let state = self.app.state();
        Ok(match self.kind {
            Kind::DateDisplay => match &state.display_text_override {
                Some(text) => text.clone(),
                None => state
                    .displayed
                    .map(|d| d.format("%b %-d, %Y").to_string())
                    .unwrap_or_default(),
            },
            Kind::LoginError => state.login_error.clone().unwrap_or_default(),
            Kind::Previous => "keyboard_arrow_left".to_string(),
            Kind::Next => "keyboard_arrow_right".to_string(),
            Kind::Expand => "Expand All".to_string(),
            Kind::Submit => "Log in".to_string(),
            Kind::Email | Kind::Password => String::new(),
        })
    }
}
