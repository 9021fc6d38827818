//! Browser session lifecycle.
//!
//! A `SessionManager` owns at most one live engine/browser/context/page
//! stack. Other components borrow the `Session` for the length of a call.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use super::browser::{
    AutomationEngine, BrowserHandle, BrowserResult, ContextHandle, EngineHandle, LaunchOptions,
    PageHandle,
};
use super::error::{ScrapeError, ScrapeResult};
use super::retry::RetryPolicy;

/// Lifecycle state of a `SessionManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Starting,
    Open,
}

/// What the engine last observed about the page. The rendered page remains
/// the ground truth; this only mirrors the most recent read.
#[derive(Debug, Default)]
pub struct SessionState {
    displayed_date: Mutex<Option<NaiveDate>>,
}

impl SessionState {
    pub fn displayed_date(&self) -> Option<NaiveDate> {
        *self.displayed_date.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_displayed_date(&self, date: Option<NaiveDate>) {
        *self.displayed_date.lock().unwrap_or_else(|e| e.into_inner()) = date;
    }
}

/// A live browser session.
pub struct Session {
    engine: Box<dyn EngineHandle>,
    browser: Box<dyn BrowserHandle>,
    context: Box<dyn ContextHandle>,
    page: Box<dyn PageHandle>,
    state: SessionState,
}

impl Session {
    pub fn page(&self) -> &dyn PageHandle {
        self.page.as_ref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Session resources, in teardown order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionResource {
    Page,
    Context,
    Browser,
    Engine,
}

impl fmt::Display for SessionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionResource::Page => "page",
            SessionResource::Context => "context",
            SessionResource::Browser => "browser",
            SessionResource::Engine => "engine",
        };
        write!(f, "{name}")
    }
}

/// One resource that failed to close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub resource: SessionResource,
    pub message: String,
}

/// Outcome of `SessionManager::stop`. Teardown never fails; individual
/// close failures are reported here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub closed: Vec<SessionResource>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, resource: SessionResource, result: BrowserResult<()>) {
        match result {
            Ok(()) => {
                debug!("Closed {}", resource);
                self.closed.push(resource);
            }
            Err(e) => {
                error!("Error closing {}: {}", resource, e);
                self.failures.push(TeardownFailure {
                    resource,
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Owns the browser session for one scraper instance.
pub struct SessionManager {
    engine: Arc<dyn AutomationEngine>,
    options: LaunchOptions,
    retry: RetryPolicy,
    status: SessionStatus,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn AutomationEngine>, options: LaunchOptions, retry: RetryPolicy) -> Self {
        Self {
            engine,
            options,
            retry,
            status: SessionStatus::Closed,
            session: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Launch the browser and open one page. Retried as a whole.
    pub async fn start(&mut self) -> ScrapeResult<&Session> {
        if self.status != SessionStatus::Closed {
            return Err(ScrapeError::SessionAlreadyOpen);
        }

        self.status = SessionStatus::Starting;
        let engine = self.engine.as_ref();
        let options = &self.options;

        let result = self
            .retry
            .run("start browser", ScrapeError::is_transient, |_| {
                launch_session(engine, options)
            })
            .await;

        match result {
            Ok(session) => {
                info!("Browser started successfully");
                self.status = SessionStatus::Open;
                let session = self.session.insert(session);
                Ok(&*session)
            }
            Err(e) => {
                error!("Failed to start browser: {}", e);
                self.status = SessionStatus::Closed;
                Err(e)
            }
        }
    }

    /// Close page, context, browser and engine. Each close is attempted even
    /// if an earlier one failed. Never fails; always ends `Closed`.
    pub async fn stop(&mut self) -> TeardownReport {
        self.status = SessionStatus::Closed;

        let Some(session) = self.session.take() else {
            return TeardownReport::default();
        };

        let report = close_all(
            Some(session.page.as_ref()),
            Some(session.context.as_ref()),
            Some(session.browser.as_ref()),
            session.engine.as_ref(),
        )
        .await;

        if report.is_clean() {
            info!("Browser closed successfully");
        } else {
            warn!(
                "Browser closed with {} teardown failure(s)",
                report.failures.len()
            );
        }
        report
    }
}

async fn close_all(
    page: Option<&dyn PageHandle>,
    context: Option<&dyn ContextHandle>,
    browser: Option<&dyn BrowserHandle>,
    engine: &dyn EngineHandle,
) -> TeardownReport {
    let mut report = TeardownReport::default();
    if let Some(page) = page {
        report.record(SessionResource::Page, page.close().await);
    }
    if let Some(context) = context {
        report.record(SessionResource::Context, context.close().await);
    }
    if let Some(browser) = browser {
        report.record(SessionResource::Browser, browser.close().await);
    }
    report.record(SessionResource::Engine, engine.stop().await);
    report
}

/// Bring up a full session. A failure part-way tears down whatever was
/// already opened so a retry starts clean.
async fn launch_session(
    engine: &dyn AutomationEngine,
    options: &LaunchOptions,
) -> ScrapeResult<Session> {
    let engine_handle = engine.start().await?;

    let browser = match engine_handle.launch(options.headless).await {
        Ok(browser) => browser,
        Err(e) => {
            close_all(None, None, None, engine_handle.as_ref()).await;
            return Err(e.into());
        }
    };

    let context = match browser
        .new_context(options.viewport, &options.user_agent)
        .await
    {
        Ok(context) => context,
        Err(e) => {
            close_all(None, None, Some(browser.as_ref()), engine_handle.as_ref()).await;
            return Err(e.into());
        }
    };

    let page = match context.new_page().await {
        Ok(page) => page,
        Err(e) => {
            close_all(
                None,
                Some(context.as_ref()),
                Some(browser.as_ref()),
                engine_handle.as_ref(),
            )
            .await;
            return Err(e.into());
        }
    };

    page.set_default_timeout(options.default_timeout);

    Ok(Session {
        engine: engine_handle,
        browser,
        context,
        page,
        state: SessionState::default(),
    })
}
