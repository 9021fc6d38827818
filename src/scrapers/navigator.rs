//! Relative date paging on the report view.
//!
//! The dashboard has no date parameter in its URLs. Reaching a date means
//! reading the date button and clicking the previous/next arrows the exact
//! number of times a person would, settling after every click.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::browser::{LoadState, PageHandle, Selector};
use super::config::{Selectors, StepTimeouts};
use super::error::ScrapeResult;
use super::session::Session;
use crate::models::{DisplayedDate, TargetDate};

/// Why navigation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationStop {
    /// The page already showed the target date.
    AlreadyThere,
    /// All planned clicks were issued.
    Completed,
    /// The paging control disappeared before the target was reached.
    ControlMissing,
    /// The paging control was disabled (earliest date, or past today).
    ControlDisabled,
    /// The displayed date could not be read; nothing was clicked.
    DisplayUnreadable,
}

/// What a call to [`DateNavigator::navigate_to`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub target: TargetDate,
    /// Displayed date before any click.
    pub start: Option<NaiveDate>,
    /// Displayed date after the last click.
    pub end: Option<NaiveDate>,
    pub clicks: u32,
    pub stop: NavigationStop,
}

impl NavigationOutcome {
    /// The page was verified to show the target afterwards.
    pub fn reached_target(&self) -> bool {
        self.end == Some(self.target.date())
    }
}

#[derive(Debug, Clone)]
pub struct DateNavigator {
    selectors: Selectors,
    timeouts: StepTimeouts,
}

impl DateNavigator {
    pub fn new(selectors: Selectors, timeouts: StepTimeouts) -> Self {
        Self {
            selectors,
            timeouts,
        }
    }

    /// Page from the displayed date to `target`.
    ///
    /// A shortfall (missing or disabled control) is logged and reported in
    /// the outcome, never raised. Click and settle failures propagate.
    pub async fn navigate_to(
        &self,
        session: &Session,
        target: TargetDate,
    ) -> ScrapeResult<NavigationOutcome> {
        let page = session.page();
        info!("Navigating to date: {}", target);

        let Some(start) = self.read_displayed_date(page).await else {
            warn!("Could not read the displayed date; staying on the current report");
            session.state().record_displayed_date(None);
            return Ok(NavigationOutcome {
                target,
                start: None,
                end: None,
                clicks: 0,
                stop: NavigationStop::DisplayUnreadable,
            });
        };
        debug!("Current date on page: {}", start);

        let days_diff = target.days_until(start);
        if days_diff == 0 {
            info!("Already on target date");
            session.state().record_displayed_date(Some(start));
            return Ok(NavigationOutcome {
                target,
                start: Some(start),
                end: Some(start),
                clicks: 0,
                stop: NavigationStop::AlreadyThere,
            });
        }

        let (control, direction) = if days_diff > 0 {
            info!("Going back {} days", days_diff);
            (&self.selectors.previous_day, Direction::Back)
        } else {
            info!("Going forward {} days", -days_diff);
            (&self.selectors.next_day, Direction::Forward)
        };
        let wanted = u32::try_from(days_diff.unsigned_abs()).unwrap_or(u32::MAX);
        let (clicks, stop) = self.page_by(page, control, direction, wanted).await?;

        let end = self.read_displayed_date(page).await;
        session.state().record_displayed_date(end);

        match end {
            Some(end) if end == target.date() => {
                debug!("Reached {} after {} click(s)", target, clicks)
            }
            Some(end) => warn!(
                "Navigation stopped on {} instead of {} after {} click(s)",
                end, target, clicks
            ),
            None => warn!("Could not verify the displayed date after navigating"),
        }

        Ok(NavigationOutcome {
            target,
            start: Some(start),
            end,
            clicks,
            stop,
        })
    }

    async fn page_by(
        &self,
        page: &dyn PageHandle,
        control: &Selector,
        direction: Direction,
        wanted: u32,
    ) -> ScrapeResult<(u32, NavigationStop)> {
        let mut clicks = 0;
        while clicks < wanted {
            let Some(button) = page.query_selector(control).await? else {
                warn!(
                    "Could not find {} arrow button on iteration {}",
                    direction,
                    clicks + 1
                );
                return Ok((clicks, NavigationStop::ControlMissing));
            };

            if button.is_disabled().await? {
                warn!("{} arrow is disabled, cannot go further {}", direction, direction.limit());
                return Ok((clicks, NavigationStop::ControlDisabled));
            }

            button.click().await?;
            clicks += 1;
            debug!("Clicked {} arrow ({}/{})", direction, clicks, wanted);

            page.wait_for_load_state(LoadState::DomContentLoaded, self.timeouts.date_navigation())
                .await?;
        }
        Ok((clicks, NavigationStop::Completed))
    }

    /// Read and parse the date button. Missing or unparseable text is `None`.
    pub async fn read_displayed_date(&self, page: &dyn PageHandle) -> Option<NaiveDate> {
        let button = match page.query_selector(&self.selectors.date_display).await {
            Ok(Some(button)) => button,
            Ok(None) => {
                warn!("Could not find date display button");
                return None;
            }
            Err(e) => {
                warn!("Could not query date display button: {}", e);
                return None;
            }
        };

        let text = match button.inner_text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not read date display button: {}", e);
                return None;
            }
        };

        match DisplayedDate::parse(&text) {
            Some(displayed) => Some(displayed.date()),
            None => {
                warn!("Could not parse date from: {}", text.trim());
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Back,
    Forward,
}

impl Direction {
    fn limit(&self) -> &'static str {
        match self {
            Direction::Back => "back",
            Direction::Forward => "forward",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Back => write!(f, "left"),
            Direction::Forward => write!(f, "right"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::browser::fake::{started, ymd, FakeDashboard, FakeState};
    use crate::scrapers::browser::BrowserError;
    use crate::scrapers::error::ScrapeError;
    use crate::scrapers::session::SessionManager;

    fn navigator() -> DateNavigator {
        DateNavigator::new(Selectors::default(), StepTimeouts::default())
    }

    async fn on_report_view(app: &FakeDashboard) -> SessionManager {
        let manager = started(app).await;
        app.position_on_report_view();
        manager
    }

    fn target(y: i32, m: u32, d: u32) -> TargetDate {
        TargetDate::new(ymd(y, m, d))
    }

    #[tokio::test]
    async fn test_no_clicks_when_already_on_target() {
        let app = FakeDashboard::default();
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 11, 4))
            .await
            .unwrap();
        assert_eq!(outcome.clicks, 0);
        assert_eq!(outcome.stop, NavigationStop::AlreadyThere);
        assert!(outcome.reached_target());
        assert_eq!(app.state().previous_clicks, 0);
        assert_eq!(app.state().next_clicks, 0);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_goes_back_exactly_k_days() {
        let app = FakeDashboard::default();
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 10, 29))
            .await
            .unwrap();
        assert_eq!(outcome.clicks, 6);
        assert_eq!(outcome.stop, NavigationStop::Completed);
        assert_eq!(outcome.start, Some(ymd(2025, 11, 4)));
        assert_eq!(outcome.end, Some(ymd(2025, 10, 29)));
        assert_eq!(app.state().previous_clicks, 6);
        assert_eq!(app.state().next_clicks, 0);
        assert_eq!(session.state().displayed_date(), Some(ymd(2025, 10, 29)));
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_goes_forward_exactly_k_days() {
        let app = FakeDashboard::new(FakeState {
            displayed: Some(ymd(2025, 10, 30)),
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 11, 2))
            .await
            .unwrap();
        assert_eq!(outcome.clicks, 3);
        assert!(outcome.reached_target());
        assert_eq!(app.state().next_clicks, 3);
        assert_eq!(app.state().previous_clicks, 0);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_disabled_control_stops_without_error() {
        // Next is disabled once today is displayed.
        let app = FakeDashboard::new(FakeState {
            displayed: Some(ymd(2025, 11, 2)),
            max_date: Some(ymd(2025, 11, 4)),
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 11, 9))
            .await
            .unwrap();
        assert_eq!(outcome.clicks, 2);
        assert_eq!(outcome.stop, NavigationStop::ControlDisabled);
        assert_eq!(outcome.end, Some(ymd(2025, 11, 4)));
        assert!(!outcome.reached_target());
        assert_eq!(app.state().next_clicks, 2);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_disabled_previous_stops_early() {
        // Nothing before Nov 1 can be shown.
        let app = FakeDashboard::new(FakeState {
            min_date: Some(ymd(2025, 11, 1)),
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 10, 28))
            .await
            .unwrap();
        assert_eq!(outcome.clicks, 3);
        assert_eq!(outcome.stop, NavigationStop::ControlDisabled);
        assert_eq!(outcome.end, Some(ymd(2025, 11, 1)));
        assert!(!outcome.reached_target());
        assert_eq!(app.state().previous_clicks, 3);
        assert_eq!(session.state().displayed_date(), Some(ymd(2025, 11, 1)));
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_settle_timeout_while_paging_is_an_error() {
        let app = FakeDashboard::new(FakeState {
            failing_settles: vec![1],
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let result = navigator().navigate_to(session, target(2025, 11, 1)).await;
        assert!(matches!(
            result,
            Err(ScrapeError::Browser(BrowserError::WaitTimeout { .. }))
        ));
        assert_eq!(app.state().previous_clicks, 1);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_missing_control_stops_early() {
        let app = FakeDashboard::new(FakeState {
            previous_missing_after: Some(1),
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 11, 1))
            .await
            .unwrap();
        assert_eq!(outcome.clicks, 1);
        assert_eq!(outcome.stop, NavigationStop::ControlMissing);
        assert_eq!(outcome.end, Some(ymd(2025, 11, 3)));
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_unreadable_display_is_a_noop() {
        let app = FakeDashboard::new(FakeState {
            display_text_override: Some("Today".to_string()),
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;
        let session = manager.session().unwrap();

        let outcome = navigator()
            .navigate_to(session, target(2025, 11, 1))
            .await
            .unwrap();
        assert_eq!(outcome.stop, NavigationStop::DisplayUnreadable);
        assert_eq!(outcome.clicks, 0);
        assert_eq!(app.state().previous_clicks, 0);
        assert_eq!(session.state().displayed_date(), None);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_missing_display_is_a_noop() {
        let app = FakeDashboard::new(FakeState {
            date_display_present: false,
            ..Default::default()
        });
        let mut manager = on_report_view(&app).await;

        let outcome = navigator()
            .navigate_to(manager.session().unwrap(), target(2025, 11, 1))
            .await
            .unwrap();
        assert_eq!(outcome.stop, NavigationStop::DisplayUnreadable);
        assert_eq!(outcome.start, None);
        manager.stop().await;
    }
}
