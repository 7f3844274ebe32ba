//! Read-side UI over the store.
//!
//! A dashboard keeps its own snapshot of the store and refreshes it after
//! its own writes and whenever the coordinator broadcasts an invalidation.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::agent::PageDirectory;
use crate::config::Settings;
use crate::coordinator::{CoordinatorHandle, Notice};
use crate::error::{ExtractError, Result};
use crate::model::{EntityKind, Store};
use crate::orchestrator::ExtractionReport;
use crate::page::PageId;
use crate::store::{self, SearchHits, StoreHandle};

/// Shown when there is no CRM page to extract from.
pub const OPEN_APP: &str = "Please open Close.com";

pub struct Dashboard {
    store: StoreHandle,
    bus: CoordinatorHandle,
    pages: PageDirectory,
    app_host: String,
    view: Store,
    notices: broadcast::Receiver<Notice>,
}

impl Dashboard {
    pub fn new(
        settings: &Settings,
        store: StoreHandle,
        bus: CoordinatorHandle,
        pages: PageDirectory,
    ) -> Result<Self> {
        let view = store.load()?;
        let notices = bus.subscribe();
        Ok(Self {
            store,
            bus,
            pages,
            app_host: settings.app_host.clone(),
            view,
            notices,
        })
    }

    pub fn view(&self) -> &Store {
        &self.view
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.view = self.store.load()?;
        Ok(())
    }

    pub fn search(&self, query: &str) -> SearchHits<'_> {
        store::search(&self.view, query)
    }

    /// Ask a page to extract. Pages that are gone or not on the CRM host are
    /// reported as unavailable without being contacted.
    pub async fn trigger(&self, page: PageId) -> Result<ExtractionReport> {
        let handle = self
            .pages
            .get(page)
            .ok_or_else(|| ExtractError::ContextUnavailable(format!("no page {}", page)))?;
        if !handle.url().contains(&self.app_host) {
            return Err(ExtractError::ContextUnavailable(format!(
                "{} is not {}",
                handle.url(),
                self.app_host
            )));
        }
        handle.extract().await
    }

    /// Trigger and turn the outcome into the line shown to the user.
    pub async fn extract(&mut self, page: PageId) -> String {
        match self.trigger(page).await {
            Ok(report) if report.success => {
                if let Err(e) = self.refresh() {
                    warn!("Refresh after extraction failed: {}", e);
                }
                format!("Success: {}", report.message)
            }
            Ok(report) => format!("Extraction failed: {}", report.message),
            Err(e) => {
                debug!("Extraction not possible: {}", e);
                OPEN_APP.to_string()
            }
        }
    }

    pub async fn is_extracting(&self, page: PageId) -> Result<bool> {
        self.bus.is_extracting(page).await
    }

    pub fn delete(&mut self, kind: EntityKind, id: &str) -> Result<bool> {
        let removed = self.store.delete(kind, id)?;
        self.refresh()?;
        Ok(removed)
    }

    pub async fn clear_all(&mut self) -> Result<()> {
        self.bus.clear_data().await?;
        self.refresh()
    }

    /// Wait for the next invalidation and refresh. Returns false once the
    /// coordinator is gone. Missed notices still cause a refresh.
    pub async fn sync_on_invalidation(&mut self) -> Result<bool> {
        match self.notices.recv().await {
            Ok(Notice::DataCleared) | Err(broadcast::error::RecvError::Lagged(_)) => {
                self.refresh()?;
                Ok(true)
            }
            Err(broadcast::error::RecvError::Closed) => Ok(false),
        }
    }
}
