//! Background coordinator.
//!
//! One long-lived task owns the per-page registry of running extractions
//! and is the only thing that clears the store. Pages and the dashboard
//! reach it through a [`CoordinatorHandle`].
//!
//! Delivery is at-most-once with no retry. `notify` drops the message if
//! the queue is full or the coordinator is gone, and a broadcast only
//! reaches receivers subscribed at send time that keep up with the channel.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::page::PageId;
use crate::store::StoreHandle;

const QUEUE_DEPTH: usize = 64;
const NOTICE_DEPTH: usize = 16;

/// Messages a page or the dashboard sends to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    ExtractionStarted,
    ExtractionCompleted { count: usize },
    ExtractStatus,
    ClearData,
    /// The page was closed or navigated away.
    PageClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Ack {
        success: bool,
    },
    Status {
        #[serde(rename = "isExtracting")]
        is_extracting: bool,
    },
    Error {
        error: String,
    },
}

impl Reply {
    fn ack() -> Self {
        Reply::Ack { success: true }
    }
}

/// Store invalidations pushed to every open page and dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notice {
    DataCleared,
}

struct Envelope {
    page: Option<PageId>,
    command: Command,
    reply: Option<oneshot::Sender<Reply>>,
}

pub struct Coordinator {
    running: HashMap<PageId, Instant>,
    store: StoreHandle,
    notices: broadcast::Sender<Notice>,
}

impl Coordinator {
    pub fn spawn(store: StoreHandle) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (notices, _) = broadcast::channel(NOTICE_DEPTH);
        let coordinator = Coordinator {
            running: HashMap::new(),
            store,
            notices: notices.clone(),
        };
        let task = tokio::spawn(coordinator.run(rx));
        info!("Background coordinator started");
        (CoordinatorHandle { tx, notices }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        while let Some(env) = rx.recv().await {
            let (reply, notice) = self.handle(env.page, env.command);
            if let Some(tx) = env.reply {
                let _ = tx.send(reply);
            }
            if let Some(notice) = notice {
                let reached = self.notices.send(notice).unwrap_or(0);
                debug!(?notice, "Broadcast to {} subscribers", reached);
            }
        }
        debug!("Coordinator queue closed");
    }

    /// Apply one message. A returned notice is broadcast after the reply.
    fn handle(&mut self, page: Option<PageId>, command: Command) -> (Reply, Option<Notice>) {
        debug!(?page, ?command, "Coordinator message");
        let reply = match command {
            Command::ExtractStatus => Reply::Status {
                is_extracting: page.is_some_and(|id| self.running.contains_key(&id)),
            },
            Command::ExtractionStarted => {
                if let Some(id) = page {
                    self.running.insert(id, Instant::now());
                    info!("Extraction started on page {}", id);
                }
                Reply::ack()
            }
            Command::ExtractionCompleted { count } => {
                if let Some(id) = page {
                    let took = self.running.remove(&id).map(|t| t.elapsed());
                    info!(?took, "Extraction completed on page {}. Count: {}", id, count);
                }
                Reply::ack()
            }
            Command::PageClosed => {
                if let Some(id) = page {
                    self.running.remove(&id);
                    debug!("Cleaned up extraction state for closed page {}", id);
                }
                Reply::ack()
            }
            Command::ClearData => {
                return match self.store.clear() {
                    Ok(()) => (Reply::ack(), Some(Notice::DataCleared)),
                    Err(e) => {
                        warn!("Clearing store failed: {}", e);
                        (Reply::Error { error: e.to_string() }, None)
                    }
                };
            }
        };
        (reply, None)
    }
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Envelope>,
    notices: broadcast::Sender<Notice>,
}

impl CoordinatorHandle {
    /// Send and wait for the reply.
    pub async fn request(&self, page: Option<PageId>, command: Command) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                page,
                command,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| ExtractError::CoordinatorGone)?;
        reply_rx.await.map_err(|_| ExtractError::CoordinatorGone)
    }

    /// Fire and forget.
    pub fn notify(&self, page: Option<PageId>, command: Command) {
        let env = Envelope {
            page,
            command,
            reply: None,
        };
        if let Err(e) = self.tx.try_send(env) {
            debug!("Dropped coordinator message: {}", e);
        }
    }

    /// Handle a raw JSON message. Anything unrecognised gets an error reply.
    pub async fn dispatch_json(&self, page: Option<PageId>, raw: &str) -> Reply {
        let command = match serde_json::from_str::<Command>(raw) {
            Ok(c) => c,
            Err(_) => {
                return Reply::Error {
                    error: "Unknown message type".to_string(),
                }
            }
        };
        self.request(page, command)
            .await
            .unwrap_or_else(|e| Reply::Error { error: e.to_string() })
    }

    pub async fn is_extracting(&self, page: PageId) -> Result<bool> {
        match self.request(Some(page), Command::ExtractStatus).await? {
            Reply::Status { is_extracting } => Ok(is_extracting),
            other => Err(ExtractError::Page(format!("unexpected status reply {:?}", other))),
        }
    }

    /// Remove the store. Subscribers get [`Notice::DataCleared`] after the ack.
    pub async fn clear_data(&self) -> Result<()> {
        match self.request(None, Command::ClearData).await? {
            Reply::Error { error } => Err(ExtractError::Page(error)),
            _ => Ok(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Batch, Contact};

    fn spawn() -> (CoordinatorHandle, StoreHandle) {
        let store = StoreHandle::in_memory("close_data").unwrap();
        let (handle, _task) = Coordinator::spawn(store.clone());
        (handle, store)
    }

    #[test]
    fn wire_names_match_the_extension_protocol() {
        let json = serde_json::to_string(&Command::ExtractionCompleted { count: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"EXTRACTION_COMPLETED","count":3}"#);

        let cmd: Command = serde_json::from_str(r#"{"type":"EXTRACT_STATUS"}"#).unwrap();
        assert_eq!(cmd, Command::ExtractStatus);

        let status = serde_json::to_string(&Reply::Status { is_extracting: true }).unwrap();
        assert_eq!(status, r#"{"isExtracting":true}"#);

        let notice = serde_json::to_string(&Notice::DataCleared).unwrap();
        assert_eq!(notice, r#"{"type":"DATA_CLEARED"}"#);
    }

    #[tokio::test]
    async fn registry_tracks_start_and_completion() {
        let (bus, _) = spawn();
        assert!(!bus.is_extracting(1).await.unwrap());

        bus.notify(Some(1), Command::ExtractionStarted);
        assert!(bus.is_extracting(1).await.unwrap());
        assert!(!bus.is_extracting(2).await.unwrap());

        bus.notify(Some(1), Command::ExtractionCompleted { count: 4 });
        assert!(!bus.is_extracting(1).await.unwrap());
    }

    #[tokio::test]
    async fn closing_a_page_drops_its_entry() {
        let (bus, _) = spawn();
        bus.notify(Some(7), Command::ExtractionStarted);
        let reply = bus.request(Some(7), Command::PageClosed).await.unwrap();
        assert_eq!(reply, Reply::Ack { success: true });
        assert!(!bus.is_extracting(7).await.unwrap());
    }

    #[tokio::test]
    async fn status_without_a_page_is_false() {
        let (bus, _) = spawn();
        bus.notify(None, Command::ExtractionStarted);
        let reply = bus.request(None, Command::ExtractStatus).await.unwrap();
        assert_eq!(reply, Reply::Status { is_extracting: false });
    }

    #[tokio::test]
    async fn clear_acks_then_broadcasts() {
        let (bus, store) = spawn();
        let batch = Batch {
            contacts: vec![Contact {
                id: "a".into(),
                name: "Ann".into(),
                lead: "Acme".into(),
                emails: vec![],
                phones: vec![],
            }],
            ..Default::default()
        };
        store.merge_batch_at(&batch, 10).unwrap();

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.clear_data().await.unwrap();

        assert_eq!(first.recv().await.unwrap(), Notice::DataCleared);
        assert_eq!(second.recv().await.unwrap(), Notice::DataCleared);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.load().unwrap().last_sync, 0);
    }

    #[tokio::test]
    async fn unknown_wire_message_is_rejected() {
        let (bus, _) = spawn();
        let reply = bus.dispatch_json(Some(1), r#"{"type":"MAKE_COFFEE"}"#).await;
        assert_eq!(reply, Reply::Error { error: "Unknown message type".into() });

        let reply = bus.dispatch_json(Some(1), r#"{"type":"EXTRACTION_STARTED"}"#).await;
        assert_eq!(reply, Reply::Ack { success: true });
        assert!(bus.is_extracting(1).await.unwrap());
    }
}
