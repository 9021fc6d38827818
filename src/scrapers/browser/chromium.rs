//! Chrome DevTools Protocol engine built on chromiumoxide.
//!
//! chromiumoxide has no notion of text selectors or element handles that
//! survive re-renders, so element lookups run a small script that tags the
//! first match with a unique `data-tdfetch-ref` attribute. Later element
//! operations address the element through that attribute.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{
    AutomationEngine, BrowserError, BrowserHandle, BrowserResult, ContextHandle, ElementHandle,
    EngineHandle, LoadState, PageHandle, Selector, Viewport,
};

/// How often wait conditions are re-checked.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attribute used to address elements found by `query_selector`.
const REF_ATTRIBUTE: &str = "data-tdfetch-ref";

/// Launches local Chrome/Chromium processes.
#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    chrome_path: Option<String>,
    args: Vec<String>,
}

impl ChromiumEngine {
    pub fn new(chrome_path: Option<String>, args: Vec<String>) -> Self {
        Self { chrome_path, args }
    }
}

#[async_trait]
impl AutomationEngine for ChromiumEngine {
    async fn start(&self) -> BrowserResult<Box<dyn EngineHandle>> {
        Ok(Box::new(ChromiumEngineHandle {
            chrome_path: self.chrome_path.clone(),
            args: self.args.clone(),
            handler_tasks: Mutex::new(Vec::new()),
        }))
    }
}

/// Owns the CDP handler tasks of every browser it launched.
struct ChromiumEngineHandle {
    chrome_path: Option<String>,
    args: Vec<String>,
    handler_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChromiumEngineHandle {
    fn browser_config(&self, headless: bool) -> BrowserResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder().viewport(None);

        if !headless {
            builder = builder.with_head();
        }

        // Fresh profile per launch so concurrent runs never share a
        // ProcessSingleton lock or cookies.
        let user_data_dir: PathBuf =
            std::env::temp_dir().join(format!("tdfetch-profile-{}", uuid::Uuid::new_v4()));
        builder = builder
            .user_data_dir(user_data_dir)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage");

        for arg in &self.args {
            builder = builder.arg(arg.clone());
        }

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| BrowserError::LaunchFailed(format!("invalid browser configuration: {e}")))
    }
}

#[async_trait]
impl EngineHandle for ChromiumEngineHandle {
    async fn launch(&self, headless: bool) -> BrowserResult<Box<dyn BrowserHandle>> {
        let config = self.browser_config(headless)?;
        debug!("Launching Chromium (headless={})", headless);

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // chromiumoxide only processes CDP traffic while the handler is polled.
        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        self.handler_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task);

        Ok(Box::new(ChromiumBrowser {
            inner: Arc::new(tokio::sync::Mutex::new(Some(browser))),
        }))
    }

    async fn stop(&self) -> BrowserResult<()> {
        let tasks: Vec<JoinHandle<()>> = self
            .handler_tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

struct ChromiumBrowser {
    inner: Arc<tokio::sync::Mutex<Option<Browser>>>,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_context(
        &self,
        viewport: Viewport,
        user_agent: &str,
    ) -> BrowserResult<Box<dyn ContextHandle>> {
        if self.inner.lock().await.is_none() {
            return Err(BrowserError::AlreadyClosed("browser"));
        }

        Ok(Box::new(ChromiumContext {
            browser: self.inner.clone(),
            viewport,
            user_agent: user_agent.to_string(),
            pages: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> BrowserResult<()> {
        let mut guard = self.inner.lock().await;

        let Some(mut browser) = guard.take() else {
            return Ok(());
        };

        browser
            .close()
            .await
            .map_err(|e| BrowserError::Interaction(format!("failed to close browser: {e}")))?;
        // Reap the child process so it does not linger as a zombie.
        if let Err(e) = browser.wait().await {
            warn!("Failed waiting for browser process exit: {}", e);
        }
        Ok(())
    }
}

/// Pages opened through one context. Each launch uses its own temporary
/// profile, so the browser's default context is already isolated.
struct ChromiumContext {
    browser: Arc<tokio::sync::Mutex<Option<Browser>>>,
    viewport: Viewport,
    user_agent: String,
    pages: Mutex<Vec<Page>>,
}

#[async_trait]
impl ContextHandle for ChromiumContext {
    async fn new_page(&self) -> BrowserResult<Box<dyn PageHandle>> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(BrowserError::AlreadyClosed("browser"))?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::LaunchFailed(format!("failed to open page: {e}")))?
        };

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.viewport.width),
            i64::from(self.viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| BrowserError::Interaction(format!("failed to set viewport: {e}")))?;

        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| BrowserError::Interaction(format!("failed to set user agent: {e}")))?;

        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(page.clone());

        Ok(Box::new(ChromiumPage::new(page)))
    }

    async fn close(&self) -> BrowserResult<()> {
        let pages: Vec<Page> = self
            .pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        for page in pages {
            // Pages already closed through their own handle report an error here.
            if let Err(e) = page.close().await {
                debug!("Context page already closed: {}", e);
            }
        }
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
    default_timeout_ms: AtomicU64,
    closed: AtomicBool,
}

impl ChromiumPage {
    fn new(page: Page) -> Self {
        Self {
            page,
            default_timeout_ms: AtomicU64::new(30_000),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrowserError::AlreadyClosed("page"))
        } else {
            Ok(())
        }
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms.load(Ordering::SeqCst))
    }

    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> BrowserResult<T> {
        let result = tokio::time::timeout(self.default_timeout(), self.page.evaluate(script))
            .await
            .map_err(|_| BrowserError::WaitTimeout {
                condition: "script evaluation".to_string(),
                timeout: self.default_timeout(),
            })?
            .map_err(|e| BrowserError::Interaction(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::Interaction(e.to_string()))
    }

    async fn ready_state(&self) -> BrowserResult<String> {
        self.evaluate("document.readyState").await
    }

    /// Poll `check` until it yields true or `timeout` expires. Errors from
    /// the check count as "not yet": pages are torn down mid-navigation.
    async fn poll_until<F, Fut>(
        &self,
        description: &str,
        timeout: Duration,
        mut check: F,
    ) -> BrowserResult<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = BrowserResult<bool>>,
    {
        let start = Instant::now();
        loop {
            if let Ok(true) = check().await {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(BrowserError::WaitTimeout {
                    condition: description.to_string(),
                    timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

fn js_string(value: &str) -> String {
    // JSON string literals are valid JavaScript string literals.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script returning a reference id for the first element matching
/// `selector`, or null.
fn find_element_script(selector: &Selector, ref_id: &str) -> String {
    let text = selector
        .has_text
        .as_deref()
        .map(js_string)
        .unwrap_or_else(|| "null".to_string());

    format!(
        r#"(() => {{
            const text = {text};
            const el = Array.from(document.querySelectorAll({css}))
                .find(e => text === null || (e.textContent || "").includes(text));
            if (!el) return null;
            let id = el.getAttribute({attr});
            if (!id) {{
                id = {ref_id};
                el.setAttribute({attr}, id);
            }}
            return id;
        }})()"#,
        text = text,
        css = js_string(&selector.css),
        attr = js_string(REF_ATTRIBUTE),
        ref_id = js_string(ref_id),
    )
}

#[async_trait]
impl PageHandle for ChromiumPage {
    fn set_default_timeout(&self, timeout: Duration) {
        self.default_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    async fn goto(&self, url: &str, wait_until: LoadState, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        let start = Instant::now();

        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: format!("timed out after {timeout:?}"),
            })?
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let remaining = timeout.saturating_sub(start.elapsed());
        self.wait_for_load_state(wait_until, remaining).await
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        let this = self;
        self.poll_until(&format!("load state {state}"), timeout, move || async move {
            let ready = this.ready_state().await?;
            Ok(state.is_reached_by(&ready))
        })
        .await
    }

    async fn wait_for_selector(&self, selector: &Selector, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        let check = find_element_script(selector, &uuid::Uuid::new_v4().to_string());
        let (this, check) = (self, check.as_str());
        self.poll_until(&format!("selector '{selector}'"), timeout, move || async move {
            let found: Option<String> = this.evaluate(check).await?;
            Ok(found.is_some())
        })
        .await
    }

    async fn wait_for_navigation(&self, state: LoadState, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;

        // A marker on `window` disappears when the document is replaced;
        // a changed href also catches client-side route changes.
        let marker = format!("__tdfetch_nav_{}", uuid::Uuid::new_v4().simple());
        let initial_href: String = self
            .evaluate(&format!(
                "(() => {{ window[{m}] = true; return window.location.href; }})()",
                m = js_string(&marker)
            ))
            .await?;

        let check = format!(
            "({{ marker: window[{m}] === true, href: window.location.href, ready: document.readyState }})",
            m = js_string(&marker)
        );

        let (this, check, initial_href) = (self, check.as_str(), initial_href.as_str());
        self.poll_until("navigation", timeout, move || async move {
            let snapshot: serde_json::Value = this.evaluate(check).await?;
            let marker_kept = snapshot["marker"].as_bool().unwrap_or(false);
            let href = snapshot["href"].as_str().unwrap_or_default();
            let ready = snapshot["ready"].as_str().unwrap_or_default();
            let navigated = !marker_kept || href != initial_href;
            Ok(navigated && state.is_reached_by(ready))
        })
        .await
    }

    async fn query_selector(
        &self,
        selector: &Selector,
    ) -> BrowserResult<Option<Box<dyn ElementHandle>>> {
        self.ensure_open()?;
        let ref_id = uuid::Uuid::new_v4().to_string();
        let found: Option<String> = self.evaluate(&find_element_script(selector, &ref_id)).await?;

        Ok(found.map(|id| {
            Box::new(ChromiumElement {
                page: self.page.clone(),
                css: format!("[{}={}]", REF_ATTRIBUTE, js_string(&id)),
                description: selector.to_string(),
            }) as Box<dyn ElementHandle>
        }))
    }

    async fn url(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        let url = self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::Interaction(e.to_string()))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn content(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Interaction(format!("failed to read page content: {e}")))
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        self.ensure_open()?;
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| BrowserError::Interaction(format!("screenshot failed: {e}")))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::Interaction(format!("failed to close page: {e}")))
    }
}

struct ChromiumElement {
    page: Page,
    /// Attribute selector addressing the tagged element.
    css: String,
    description: String,
}

impl ChromiumElement {
    async fn resolve(&self) -> BrowserResult<chromiumoxide::element::Element> {
        self.page
            .find_element(self.css.as_str())
            .await
            .map_err(|_| BrowserError::ElementNotFound(self.description.clone()))
    }

    async fn evaluate_on<T: DeserializeOwned>(&self, body: &str) -> BrowserResult<T> {
        let script = format!(
            "(() => {{ const el = document.querySelector({css}); {body} }})()",
            css = js_string(&self.css),
        );
        self.page
            .evaluate(script.as_str())
            .await
            .map_err(|e| BrowserError::Interaction(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Interaction(e.to_string()))
    }
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn click(&self) -> BrowserResult<()> {
        self.resolve()
            .await?
            .click()
            .await
            .map_err(|e| BrowserError::Interaction(format!("click on {} failed: {e}", self.description)))?;
        Ok(())
    }

    async fn fill(&self, text: &str) -> BrowserResult<()> {
        let element = self.resolve().await?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Interaction(format!("focus on {} failed: {e}", self.description)))?;

        let cleared: bool = self
            .evaluate_on(
                "if (!el) return false; el.value = ''; \
                 el.dispatchEvent(new Event('input', { bubbles: true })); return true;",
            )
            .await?;
        if !cleared {
            return Err(BrowserError::ElementNotFound(self.description.clone()));
        }

        element
            .type_str(text)
            .await
            .map_err(|e| BrowserError::Interaction(format!("typing into {} failed: {e}", self.description)))?;
        Ok(())
    }

    async fn is_disabled(&self) -> BrowserResult<bool> {
        let state: Option<bool> = self
            .evaluate_on(
                "if (!el) return null; \
                 return el.disabled === true || el.getAttribute('aria-disabled') === 'true';",
            )
            .await?;
        state.ok_or_else(|| BrowserError::ElementNotFound(self.description.clone()))
    }

    async fn inner_text(&self) -> BrowserResult<String> {
        let text = self
            .resolve()
            .await?
            .inner_text()
            .await
            .map_err(|e| BrowserError::Interaction(e.to_string()))?;
        Ok(text.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_element_script_escapes_selector() {
        let selector = Selector::with_text("button[title=\"x\"]", "it's \"quoted\"");
        let script = find_element_script(&selector, "ref-1");
        assert!(script.contains(r#""button[title=\"x\"]""#));
        assert!(script.contains(r#""it's \"quoted\"""#));
        assert!(script.contains(r#""ref-1""#));
    }

    #[test]
    fn test_find_element_script_without_text() {
        let script = find_element_script(&Selector::css("input"), "ref-2");
        assert!(script.contains("const text = null;"));
    }

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn test_launch_and_close() {
        let engine = ChromiumEngine::default();
        let handle = engine.start().await.expect("engine start");
        let browser = handle.launch(true).await.expect("launch");
        let context = browser
            .new_context(Viewport { width: 1280, height: 720 }, "tdfetch-test")
            .await
            .expect("context");
        let page = context.new_page().await.expect("page");

        page.goto("about:blank", LoadState::Load, Duration::from_secs(10))
            .await
            .expect("goto");
        assert_eq!(page.url().await.expect("url"), "about:blank");

        page.close().await.expect("page close");
        context.close().await.expect("context close");
        browser.close().await.expect("browser close");
        handle.stop().await.expect("engine stop");
    }
}
