//! Page-side extractor and the directory of open pages.
//!
//! Each open page gets an agent task with its own inbox and its own
//! [`Orchestrator`]. The agent never blocks on a run: runs are spawned so a
//! second trigger reaches the orchestrator's guard and is turned away.
//! Closing a page aborts the agent and anything it was running, then tells
//! the coordinator so its registry entry goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use crate::config::Settings;
use crate::coordinator::{Command, CoordinatorHandle, Notice};
use crate::error::{ExtractError, Result};
use crate::indicator::StatusIndicator;
use crate::orchestrator::{ExtractionReport, Orchestrator};
use crate::page::{Page, PageId};
use crate::store::StoreHandle;

const INBOX_DEPTH: usize = 16;

pub enum PageMessage {
    /// Explicit request; the report comes back on `reply`.
    ExtractData { reply: oneshot::Sender<ExtractionReport> },
    /// New record markup appeared on the page.
    ContentChanged,
}

/// Wire form of the requests a page accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRequest {
    ExtractData,
}

#[derive(Clone)]
pub struct PageHandle {
    id: PageId,
    url: String,
    tx: mpsc::Sender<PageMessage>,
}

impl PageHandle {
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn extract(&self) -> Result<ExtractionReport> {
        let (reply, rx) = oneshot::channel();
        let gone = || ExtractError::ContextUnavailable(format!("page {} is closed", self.id));
        self.tx
            .send(PageMessage::ExtractData { reply })
            .await
            .map_err(|_| gone())?;
        rx.await.map_err(|_| gone())
    }

    /// Handle a raw JSON request. Unknown types are rejected without
    /// reaching the agent.
    pub async fn dispatch_json(&self, raw: &str) -> Result<ExtractionReport> {
        match serde_json::from_str::<PageRequest>(raw) {
            Ok(PageRequest::ExtractData) => self.extract().await,
            Err(_) => Ok(ExtractionReport {
                success: false,
                message: "Unknown message type".to_string(),
                count: 0,
                attempts: 0,
            }),
        }
    }

    /// Fire and forget; dropped if the inbox is full.
    pub fn content_changed(&self) {
        if self.tx.try_send(PageMessage::ContentChanged).is_err() {
            debug!("Page {} inbox full, dropping change notice", self.id);
        }
    }
}

struct PageAgent {
    id: PageId,
    page: Arc<dyn Page>,
    orch: Arc<Orchestrator>,
    notices: broadcast::Receiver<Notice>,
}

impl PageAgent {
    async fn run(mut self, mut inbox: mpsc::Receiver<PageMessage>) {
        let mut runs = JoinSet::new();
        let mut notices_open = true;

        loop {
            tokio::select! {
                msg = inbox.recv() => match msg {
                    Some(PageMessage::ExtractData { reply }) => {
                        let (orch, page) = (Arc::clone(&self.orch), Arc::clone(&self.page));
                        runs.spawn(async move {
                            let report = orch.run(&*page).await;
                            let _ = reply.send(report);
                        });
                    }
                    Some(PageMessage::ContentChanged) => {
                        debug!("DOM change detected on page {}, triggering extraction", self.id);
                        let (orch, page) = (Arc::clone(&self.orch), Arc::clone(&self.page));
                        runs.spawn(async move {
                            orch.run(&*page).await;
                        });
                    }
                    None => break,
                },
                notice = self.notices.recv(), if notices_open => match notice {
                    Ok(Notice::DataCleared) => info!("Page {}: store cleared", self.id),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Page {} missed {} notices", self.id, n)
                    }
                    Err(broadcast::error::RecvError::Closed) => notices_open = false,
                },
                Some(_) = runs.join_next(), if !runs.is_empty() => {}
            }
        }

        debug!("Page {} agent stopped", self.id);
    }
}

struct Entry {
    handle: PageHandle,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Pages {
    next_id: PageId,
    open: HashMap<PageId, Entry>,
}

/// Open pages, the analogue of browser tabs.
#[derive(Clone)]
pub struct PageDirectory {
    pages: Arc<Mutex<Pages>>,
    settings: Settings,
    store: StoreHandle,
    bus: CoordinatorHandle,
    indicator: Arc<dyn StatusIndicator>,
}

impl PageDirectory {
    pub fn new(
        settings: Settings,
        store: StoreHandle,
        bus: CoordinatorHandle,
        indicator: Arc<dyn StatusIndicator>,
    ) -> Self {
        Self {
            pages: Arc::new(Mutex::new(Pages::default())),
            settings,
            store,
            bus,
            indicator,
        }
    }

    fn pages(&self) -> MutexGuard<'_, Pages> {
        self.pages.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start an agent for `page` and return its handle.
    pub fn open(&self, page: Arc<dyn Page>) -> PageHandle {
        let mut pages = self.pages();
        pages.next_id += 1;
        let id = pages.next_id;

        let (tx, inbox) = mpsc::channel(INBOX_DEPTH);
        let handle = PageHandle {
            id,
            url: page.url(),
            tx,
        };
        let agent = PageAgent {
            id,
            page,
            orch: Arc::new(Orchestrator::new(
                id,
                self.settings.clone(),
                self.store.clone(),
                self.bus.clone(),
                Arc::clone(&self.indicator),
            )),
            notices: self.bus.subscribe(),
        };
        let task = tokio::spawn(agent.run(inbox));
        info!("Opened page {} at {}", id, handle.url);

        pages.open.insert(
            id,
            Entry {
                handle: handle.clone(),
                task,
            },
        );
        handle
    }

    pub fn get(&self, id: PageId) -> Option<PageHandle> {
        self.pages().open.get(&id).map(|e| e.handle.clone())
    }

    pub fn ids(&self) -> Vec<PageId> {
        let mut ids: Vec<_> = self.pages().open.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Close a page: its in-flight work is abandoned and the coordinator
    /// forgets it. Returns false for an unknown id.
    pub fn close(&self, id: PageId) -> bool {
        let Some(entry) = self.pages().open.remove(&id) else {
            return false;
        };
        entry.task.abort();
        self.bus.notify(Some(id), Command::PageClosed);
        info!("Closed page {}", id);
        true
    }
}
