//! One extraction run against one page.
//!
//! `Idle → Running → {Completed, Failed}`. At most one run per page is in
//! flight; a second request while `Running` is turned away, never queued.
//! The running state is held by a [`RunGuard`] so every exit path,
//! including a panic in a scraper, leaves the page runnable again.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::coordinator::{Command, CoordinatorHandle};
use crate::error::Result;
use crate::indicator::{StatusIndicator, StatusKind};
use crate::model::Batch;
use crate::page::{Page, PageId};
use crate::pagination;
use crate::parser::{self, Route};
use crate::store::StoreHandle;

pub const ALREADY_RUNNING: &str = "Extraction already in progress";
pub const NO_ITEMS: &str = "No items found. Try scrolling?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed { count: usize },
    Failed,
}

/// Reply to a trigger. `attempts` is diagnostic and stays off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub success: bool,
    pub message: String,
    pub count: usize,
    #[serde(skip)]
    pub attempts: u32,
}

impl ExtractionReport {
    fn busy() -> Self {
        Self {
            success: false,
            message: ALREADY_RUNNING.to_string(),
            count: 0,
            attempts: 0,
        }
    }
}

struct RunGuard {
    state: Arc<Mutex<RunState>>,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self, end: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = end;
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RunState::Failed;
        }
    }
}

pub struct Orchestrator {
    page_id: PageId,
    state: Arc<Mutex<RunState>>,
    settings: Settings,
    store: StoreHandle,
    bus: CoordinatorHandle,
    indicator: Arc<dyn StatusIndicator>,
}

impl Orchestrator {
    pub fn new(
        page_id: PageId,
        settings: Settings,
        store: StoreHandle,
        bus: CoordinatorHandle,
        indicator: Arc<dyn StatusIndicator>,
    ) -> Self {
        Self {
            page_id,
            state: Arc::new(Mutex::new(RunState::Idle)),
            settings,
            store,
            bus,
            indicator,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self) -> Option<RunGuard> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == RunState::Running {
            return None;
        }
        *state = RunState::Running;
        Some(RunGuard {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }

    pub async fn run(&self, page: &dyn Page) -> ExtractionReport {
        let Some(guard) = self.begin() else {
            warn!(page = self.page_id, "Extraction already in progress, ignoring request");
            return ExtractionReport::busy();
        };

        self.indicator.show("Extracting data...", StatusKind::Info);
        self.bus.notify(Some(self.page_id), Command::ExtractionStarted);

        let report = match self.extract(page).await {
            Ok((count, attempts)) => {
                guard.finish(RunState::Completed { count });
                if count > 0 {
                    self.indicator
                        .show(&format!("✓ Extracted {} items", count), StatusKind::Success);
                } else {
                    self.indicator.show(NO_ITEMS, StatusKind::Error);
                }
                ExtractionReport {
                    success: true,
                    message: if count > 0 {
                        format!("Successfully extracted {} items.", count)
                    } else {
                        NO_ITEMS.to_string()
                    },
                    count,
                    attempts,
                }
            }
            Err(e) => {
                error!(page = self.page_id, "Extraction error: {}", e);
                guard.finish(RunState::Failed);
                self.indicator.show("Extraction failed", StatusKind::Error);
                ExtractionReport {
                    success: false,
                    message: e.to_string(),
                    count: 0,
                    attempts: 0,
                }
            }
        };

        self.bus.notify(
            Some(self.page_id),
            Command::ExtractionCompleted {
                count: report.count,
            },
        );
        self.schedule_dismiss();
        report
    }

    /// Paginate, scrape with retries, merge. Returns the record count and
    /// the number of scrape attempts.
    async fn extract(&self, page: &dyn Page) -> Result<(usize, u32)> {
        let url = page.url();
        info!(page = self.page_id, "Triggered on: {}", url);

        let scrolls = pagination::scroll_to_load_all(
            page,
            self.settings.scroll_delay(),
            self.settings.scroll_attempts,
        )
        .await;

        let route = Route::for_url(&url);
        let mut batch = Batch::default();
        let mut attempt = 0;

        while attempt < self.settings.retry_attempts && batch.is_empty() {
            if attempt > 0 {
                tokio::time::sleep(self.settings.retry_delay()).await;
            }
            let html = page.html()?;
            batch = parser::scrape(route, &html);
            attempt += 1;
        }

        let count = batch.total();
        self.store.merge_batch(&batch)?;
        info!(
            page = self.page_id,
            ?route,
            scrolls,
            attempts = attempt,
            contacts = batch.contacts.len(),
            opportunities = batch.opportunities.len(),
            tasks = batch.tasks.len(),
            "Saved. Count: {}",
            count
        );
        Ok((count, attempt))
    }

    fn schedule_dismiss(&self) {
        let indicator = Arc::clone(&self.indicator);
        let delay = self.settings.indicator_dismiss();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            indicator.hide();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use crate::error::ExtractError;
    use crate::indicator::{IndicatorEvent, RecordingIndicator};
    use crate::page::{ScrollTarget, StaticPage};
    use crate::parser::tests::fixture_html;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Harness {
        orch: Arc<Orchestrator>,
        store: StoreHandle,
        bus: CoordinatorHandle,
        indicator: Arc<RecordingIndicator>,
    }

    fn harness() -> Harness {
        let store = StoreHandle::in_memory("close_data").unwrap();
        let (bus, _task) = Coordinator::spawn(store.clone());
        let indicator = Arc::new(RecordingIndicator::default());
        let orch = Arc::new(Orchestrator::new(
            1,
            Settings::default(),
            store.clone(),
            bus.clone(),
            indicator.clone(),
        ));
        Harness { orch, store, bus, indicator }
    }

    /// Counts snapshot reads and can be told to fail or to stall.
    struct ProbePage {
        url: String,
        html: String,
        reads: AtomicU32,
        fail: bool,
    }

    impl ProbePage {
        fn new(url: &str, html: String) -> Self {
            Self { url: url.into(), html, reads: AtomicU32::new(0), fail: false }
        }
    }

    impl Page for ProbePage {
        fn url(&self) -> String {
            self.url.clone()
        }

        fn html(&self) -> Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractError::Page("page went away".into()));
            }
            Ok(self.html.clone())
        }

        fn scroll_extent(&self, _target: ScrollTarget) -> u64 {
            self.html.len() as u64
        }

        fn scroll_to(&self, _target: ScrollTarget, _offset: u64) {}
    }

    #[tokio::test(start_paused = true)]
    async fn leads_page_is_extracted_and_merged() {
        let h = harness();
        let page = StaticPage::new("https://app.close.com/leads/", fixture_html("leads"));

        let report = h.orch.run(&page).await;
        assert!(report.success);
        assert_eq!(report.count, 3);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.message, "Successfully extracted 3 items.");
        assert_eq!(h.orch.state(), RunState::Completed { count: 3 });

        assert_eq!(
            h.indicator.current(),
            Some(("✓ Extracted 3 items".to_string(), StatusKind::Success))
        );

        let store = h.store.load().unwrap();
        assert_eq!(store.contacts.len(), 3);
        assert!(store.last_sync > 0);
        assert!(!h.bus.is_extracting(1).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_retries_exactly_five_times() {
        let h = harness();
        let page = ProbePage::new("https://app.close.com/tasks/", "<p>loading</p>".into());

        let start = tokio::time::Instant::now();
        let report = h.orch.run(&page).await;

        assert!(report.success);
        assert_eq!(report.count, 0);
        assert_eq!(report.attempts, 5);
        assert_eq!(report.message, NO_ITEMS);
        // one read to pick the scroll target, five scrape attempts
        assert_eq!(page.reads.load(Ordering::SeqCst), 6);
        // one 300ms scroll, four 500ms gaps between attempts
        assert_eq!(start.elapsed(), Duration::from_millis(300 + 4 * 500));
        assert_eq!(h.orch.state(), RunState::Completed { count: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn empty_run_still_stamps_the_store() {
        let h = harness();
        let page = StaticPage::new("https://app.close.com/tasks/", "");
        h.orch.run(&page).await;
        assert!(h.store.load().unwrap().last_sync > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_while_running_is_rejected() {
        let h = harness();
        let page = Arc::new(ProbePage::new("https://app.close.com/tasks/", "<p></p>".into()));

        let first = {
            let orch = Arc::clone(&h.orch);
            let page = Arc::clone(&page);
            tokio::spawn(async move { orch.run(&*page).await })
        };
        // let the first run reach its pagination wait
        tokio::task::yield_now().await;
        while h.orch.state() != RunState::Running {
            tokio::task::yield_now().await;
        }

        let before = h.store.load().unwrap();
        let second = h.orch.run(&*page).await;
        assert!(!second.success);
        assert_eq!(second.message, ALREADY_RUNNING);
        assert_eq!(h.store.load().unwrap(), before);

        let first = first.await.unwrap();
        assert!(first.success);

        let third = h.orch.run(&*page).await;
        assert!(third.success);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_releases_the_guard() {
        let h = harness();
        let mut page = ProbePage::new("https://app.close.com/leads/", String::new());
        page.fail = true;

        let report = h.orch.run(&page).await;
        assert!(!report.success);
        assert_eq!(report.count, 0);
        assert!(report.message.contains("page went away"));
        assert_eq!(h.orch.state(), RunState::Failed);
        assert_eq!(
            h.indicator.current(),
            Some(("Extraction failed".to_string(), StatusKind::Error))
        );
        assert!(!h.bus.is_extracting(1).await.unwrap());

        page.fail = false;
        assert!(h.orch.run(&page).await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_is_dismissed_after_delay() {
        let h = harness();
        let page = StaticPage::new("https://app.close.com/leads/", fixture_html("leads"));
        h.orch.run(&page).await;
        assert_ne!(h.indicator.events().last(), Some(&IndicatorEvent::Hide));

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(h.indicator.events().last(), Some(&IndicatorEvent::Hide));
        assert_eq!(
            h.indicator.events()[0],
            IndicatorEvent::Show("Extracting data...".into(), StatusKind::Info)
        );
    }

    #[test]
    fn dropped_guard_marks_failure() {
        let state = Arc::new(Mutex::new(RunState::Running));
        drop(RunGuard { state: Arc::clone(&state), finished: false });
        assert_eq!(*state.lock().unwrap(), RunState::Failed);
    }

    #[test]
    fn report_wire_shape() {
        let report = ExtractionReport {
            success: true,
            message: "ok".into(),
            count: 2,
            attempts: 3,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"success":true,"message":"ok","count":2}"#);
    }
}
